//! The agent's view of its own session.
//!
//! Both agent loops (capture and commands) address the relay with the same
//! session id. [`AgentSession`] owns that id: it registers at start-up,
//! retrying forever, and registers again when either loop reports that the
//! relay no longer knows the session. Loops watch the id through a
//! [`tokio::sync::watch`] channel so a re-registration is seen by both.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

use crate::api::SharedRelay;
use crate::backoff::{Backoff, sleep_while_running};
use crate::protocol::{RegisterRequest, SessionId};

/// Shared registration state for one agent process.
pub struct AgentSession {
    relay: SharedRelay,
    request: RegisterRequest,
    current: watch::Sender<Option<SessionId>>,
    // Serializes re-registration so two loops losing the session at once
    // produce one new id, not two.
    recovering: Mutex<()>,
    retry_base: Duration,
    retry_max: Duration,
    running: Arc<AtomicBool>,
}

impl AgentSession {
    pub fn new(
        relay: SharedRelay,
        request: RegisterRequest,
        retry_base: Duration,
        retry_max: Duration,
        running: Arc<AtomicBool>,
    ) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            relay,
            request,
            current,
            recovering: Mutex::new(()),
            retry_base,
            retry_max,
            running,
        }
    }

    /// The id currently in use, if registered.
    pub fn id(&self) -> Option<SessionId> {
        self.current.borrow().clone()
    }

    /// Observe id changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionId>> {
        self.current.subscribe()
    }

    /// Register with the relay, retrying with backoff until it succeeds.
    ///
    /// Returns `None` only if the process is asked to stop first.
    pub async fn establish(&self) -> Option<SessionId> {
        let mut backoff = Backoff::new(self.retry_base, self.retry_max);
        loop {
            match self.relay.register(self.request.clone()).await {
                Ok(id) => {
                    info!(session = %id, "registered with relay");
                    self.current.send_replace(Some(id.clone()));
                    return Some(id);
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        attempt = backoff.failures(),
                        retry_in_ms = delay.as_millis() as u64,
                        "registration failed: {e}"
                    );
                    if !sleep_while_running(delay, &self.running).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Replace `lost` with a fresh registration.
    ///
    /// If another loop already replaced it, the newer id is returned
    /// without registering again.
    pub async fn recover(&self, lost: &SessionId) -> Option<SessionId> {
        let _guard = self.recovering.lock().await;
        match self.id() {
            Some(current) if &current != lost => Some(current),
            _ => {
                warn!(session = %lost, "relay no longer knows this session, re-registering");
                self.current.send_replace(None);
                self.establish().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::api::RelayApi;
    use crate::error::SpanError;
    use crate::protocol::{Capabilities, Command, Frame, QueuedCommand, SessionSummary};
    use crate::relay::{PublishOutcome, RelayService};

    /// Fails the first `failures` registrations, then delegates.
    struct Flaky {
        inner: RelayService,
        failures: AtomicUsize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl RelayApi for Flaky {
        async fn register(&self, request: RegisterRequest) -> Result<SessionId, SpanError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(SpanError::TransientNetwork("connection refused".into()));
            }
            self.inner.register(request)
        }
        async fn drain_commands(&self, id: &SessionId) -> Result<Vec<QueuedCommand>, SpanError> {
            self.inner.drain_commands(id)
        }
        async fn publish_frame(
            &self,
            id: &SessionId,
            frame: Frame,
        ) -> Result<PublishOutcome, SpanError> {
            self.inner.publish_frame(id, frame)
        }
        async fn enqueue_command(&self, id: &SessionId, command: Command) -> Result<(), SpanError> {
            self.inner.enqueue_command(id, command)
        }
        async fn fetch_frame(&self, id: &SessionId) -> Result<Option<Frame>, SpanError> {
            self.inner.fetch_frame(id)
        }
        async fn list_sessions(&self) -> Result<Vec<SessionSummary>, SpanError> {
            Ok(self.inner.list_sessions())
        }
    }

    fn session(failures: usize, running: bool) -> (Arc<Flaky>, AgentSession) {
        let relay = Arc::new(Flaky {
            inner: RelayService::default(),
            failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        });
        let agent = AgentSession::new(
            relay.clone(),
            RegisterRequest::for_host(Capabilities::default()),
            Duration::from_millis(1),
            Duration::from_millis(4),
            Arc::new(AtomicBool::new(running)),
        );
        (relay, agent)
    }

    #[tokio::test]
    async fn establish_retries_until_registered() {
        let (relay, agent) = session(3, true);
        let id = agent.establish().await.unwrap();
        assert_eq!(relay.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(agent.id(), Some(id));
    }

    #[tokio::test]
    async fn establish_gives_up_when_stopped() {
        let (_relay, agent) = session(usize::MAX, false);
        assert!(agent.establish().await.is_none());
    }

    #[tokio::test]
    async fn recover_registers_once_for_the_same_loss() {
        let (relay, agent) = session(0, true);
        let first = agent.establish().await.unwrap();
        let mut watcher = agent.subscribe();

        let second = agent.recover(&first).await.unwrap();
        assert_ne!(first, second);
        // A second loop reporting the same loss reuses the new id.
        assert_eq!(agent.recover(&first).await, Some(second.clone()));
        assert_eq!(relay.attempts.load(Ordering::SeqCst), 2);

        assert!(watcher.has_changed().unwrap());
        assert_eq!(*watcher.borrow_and_update(), Some(second));
    }
}
