//! Agent-side screen capture.
//!
//! | Module        | Purpose                                          |
//! |---------------|--------------------------------------------------|
//! | `types`       | Raw frame buffers and pixel formats              |
//! | `source`      | `ScreenSource` seam and the GDI grabber          |
//! | `fingerprint` | Content digest, skip-if-unchanged detection      |
//! | `encoder`     | Downscale + JPEG                                 |
//! | `pipeline`    | One tick of the capture state machine            |
//! | `service`     | Paced loop publishing frames to the relay        |

pub mod encoder;
pub mod fingerprint;
pub mod pipeline;
pub mod service;
pub mod source;
pub mod types;

pub use encoder::{EncodedImage, FrameEncoder};
pub use fingerprint::{ChangeDetector, Fingerprint};
pub use pipeline::{CapturePipeline, PipelineState, SourceClock, TickOutcome};
pub use service::{CaptureService, CaptureServiceConfig};
pub use source::{GdiCapturer, ScreenSource};
pub use types::{PixelFormat, RawScreenFrame};
