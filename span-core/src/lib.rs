//! # span-core
//!
//! Core library for span, a polling relay that lets a controller watch and
//! drive a remote desktop agent that neither side can reach directly.
//!
//! This crate contains:
//! - **Protocol**: `SessionId`, `Command`, `Frame` and their JSON wire forms
//! - **Relay**: `SessionRegistry`, `CommandQueues`, `FrameStore` behind `RelayService`
//! - **API**: the `RelayApi` trait, implemented in-process and over HTTP (`RelayClient`)
//! - **Capture**: change-detecting screen capture pipeline and its publish loop
//! - **Input**: `CommandDispatcher`, the named-key table and injection backends
//! - **Agent**: shared session registration with automatic re-registration
//! - **Controller**: frame polling loop and local-event translation
//! - **Error**: `SpanError`, a `thiserror`-based taxonomy shared by all of it

pub mod agent;
pub mod api;
pub mod backoff;
pub mod capture;
pub mod client;
pub mod controller;
pub mod error;
pub mod input;
pub mod protocol;
pub mod relay;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use agent::AgentSession;
pub use api::{RelayApi, SharedRelay};
pub use backoff::{Backoff, Recovery, recovery_for};
pub use client::RelayClient;
pub use controller::{
    CommandSender, ControllerConfig, ControllerLoop, FrameSurface, ViewEvent, Viewport,
};
pub use error::{ErrorBody, SpanError};
pub use protocol::{
    Capabilities, Command, Frame, KeyAction, MouseButton, PointerAction, QueuedCommand,
    RegisterRequest, SessionId, SessionSummary, SystemAction,
};
pub use relay::{PublishOutcome, RelayConfig, RelayService};

// ── Agent-side re-exports ────────────────────────────────────────
pub use capture::{CapturePipeline, CaptureService, CaptureServiceConfig, FrameEncoder, GdiCapturer, ScreenSource};
pub use input::{
    CommandDispatcher, CommandService, CommandServiceConfig, InputBackend, SendInputBackend,
    UnavailableBackend,
};
