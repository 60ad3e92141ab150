//! The relay request/response contract.
//!
//! Agents and controllers talk to the relay only through [`RelayApi`].
//! [`RelayService`](crate::relay::RelayService) implements it in-process;
//! [`RelayClient`](crate::client::RelayClient) implements it over HTTP.
//! Every call returns immediately: "nothing yet" is an empty result,
//! never a wait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SpanError;
use crate::protocol::{Command, Frame, QueuedCommand, RegisterRequest, SessionId, SessionSummary};
use crate::relay::PublishOutcome;

#[async_trait]
pub trait RelayApi: Send + Sync {
    /// Agent → relay: obtain a fresh session id.
    async fn register(&self, request: RegisterRequest) -> Result<SessionId, SpanError>;

    /// Agent → relay: refresh liveness and take every pending command.
    async fn drain_commands(&self, id: &SessionId) -> Result<Vec<QueuedCommand>, SpanError>;

    /// Agent → relay: offer a new frame.
    async fn publish_frame(&self, id: &SessionId, frame: Frame) -> Result<PublishOutcome, SpanError>;

    /// Controller → relay: queue a command for the agent.
    async fn enqueue_command(&self, id: &SessionId, command: Command) -> Result<(), SpanError>;

    /// Controller → relay: latest frame, `None` if nothing has been published.
    async fn fetch_frame(&self, id: &SessionId) -> Result<Option<Frame>, SpanError>;

    /// Controller → relay: snapshot of live sessions.
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, SpanError>;
}

/// Shared handle used by the long-running loops.
pub type SharedRelay = Arc<dyn RelayApi>;
