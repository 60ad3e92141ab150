//! Wire types shared by the relay, agents and controllers.
//!
//! All payloads are JSON with camelCase field names.

pub mod command;
pub mod frame;
pub mod session;

pub use command::{Command, KeyAction, MouseButton, PointerAction, QueuedCommand, SystemAction};
pub use frame::{FetchFrameResponse, Frame, FrameView, PublishAck, PublishFrameRequest};
pub use session::{Capabilities, RegisterRequest, RegisterResponse, SessionId, SessionSummary};
