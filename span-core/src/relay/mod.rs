//! Relay-side state: session registry, command queues and frame store,
//! composed behind [`RelayService`].
//!
//! | Module     | Purpose                                            |
//! |------------|----------------------------------------------------|
//! | `registry` | Session ids, liveness timestamps, expiry           |
//! | `queue`    | Bounded per-session FIFO of pending commands       |
//! | `frames`   | Single-slot, monotonic-timestamp frame cache       |
//! | `service`  | Owner of all three; the request/response surface   |

pub mod frames;
pub mod queue;
pub mod registry;
pub mod service;

pub use frames::{FrameStore, PublishOutcome};
pub use queue::{CommandQueues, EnqueueOutcome};
pub use registry::{SessionRecord, SessionRegistry};
pub use service::{RelayConfig, RelayService};
