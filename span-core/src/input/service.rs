//! Agent-side command loop.
//!
//! Polls the relay for queued commands and hands each batch to the
//! [`CommandDispatcher`]. The drain doubles as the agent's heartbeat, so
//! this loop runs even on hosts without input injection: commands are
//! then drained and reported as failed, and the session stays alive.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::agent::AgentSession;
use crate::api::SharedRelay;
use crate::backoff::{Backoff, Recovery, recovery_for, sleep_while_running};
use crate::error::SpanError;
use crate::input::backend::InputBackend;
use crate::input::dispatcher::{CommandDispatcher, DispatchReport};
use crate::protocol::SessionId;

#[derive(Debug, Clone)]
pub struct CommandServiceConfig {
    pub poll_interval: Duration,
    pub retry_base: Duration,
    pub retry_max: Duration,
}

impl Default for CommandServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            retry_base: Duration::from_secs(2),
            retry_max: Duration::from_secs(30),
        }
    }
}

pub struct CommandService<B> {
    dispatcher: CommandDispatcher<B>,
    relay: SharedRelay,
    session: Arc<AgentSession>,
    config: CommandServiceConfig,
    running: Arc<AtomicBool>,
    totals: DispatchReport,
}

impl<B: InputBackend> CommandService<B> {
    pub fn new(
        dispatcher: CommandDispatcher<B>,
        relay: SharedRelay,
        session: Arc<AgentSession>,
        config: CommandServiceConfig,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            dispatcher,
            relay,
            session,
            config,
            running,
            totals: DispatchReport::default(),
        }
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Running totals across every batch.
    pub fn totals(&self) -> DispatchReport {
        self.totals
    }

    pub async fn run(&mut self) {
        let mut backoff = Backoff::new(self.config.retry_base, self.config.retry_max);
        info!(
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "command loop started"
        );

        while self.running.load(Ordering::SeqCst) {
            let loop_start = Instant::now();

            let Some(id) = self.session.id() else {
                if !sleep_while_running(self.config.poll_interval, &self.running).await {
                    break;
                }
                continue;
            };

            match self.poll_once(&id).await {
                Ok(_) => {
                    backoff.reset();
                    let elapsed = loop_start.elapsed();
                    if elapsed < self.config.poll_interval {
                        sleep_while_running(self.config.poll_interval - elapsed, &self.running)
                            .await;
                    }
                }
                Err(e) => match recovery_for(&e) {
                    Recovery::Reregister => {
                        self.session.recover(&id).await;
                    }
                    Recovery::Retry => {
                        let delay = backoff.next_delay();
                        warn!(
                            failures = backoff.failures(),
                            retry_in_ms = delay.as_millis() as u64,
                            "command poll failed: {e}"
                        );
                        sleep_while_running(delay, &self.running).await;
                    }
                },
            }
        }

        let totals = self.totals;
        info!(
            executed = totals.executed,
            refused = totals.refused,
            failed = totals.failed,
            "command loop stopped"
        );
    }

    /// Drain and execute one batch.
    pub async fn poll_once(&mut self, id: &SessionId) -> Result<DispatchReport, SpanError> {
        let batch = self.relay.drain_commands(id).await?;
        if batch.is_empty() {
            return Ok(DispatchReport::default());
        }
        let report = self.dispatcher.dispatch_all(&batch);
        debug!(
            executed = report.executed,
            refused = report.refused,
            failed = report.failed,
            "command batch done"
        );
        self.totals.executed += report.executed;
        self.totals.refused += report.refused;
        self.totals.failed += report.failed;
        Ok(report)
    }
}
