//! Agent service: wires capture and input to a relay session.
//!
//! The agent detects what this host can do, registers once, and then runs
//! two independent loops against the shared [`AgentSession`]: a capture
//! loop that publishes frames and a command loop that drains and injects
//! input. The command loop always runs, even on a host that cannot
//! inject, because its polling is what keeps the session alive.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use span_core::{
    AgentSession, Capabilities, CapturePipeline, CaptureService, CommandDispatcher,
    CommandService, GdiCapturer, InputBackend, RegisterRequest, RelayClient, SendInputBackend,
    SessionId, SharedRelay, UnavailableBackend,
};

use crate::config::AgentConfig;

/// What this host turned out to support.
pub struct HostDevices {
    pub capturer: Option<GdiCapturer>,
    pub input: Box<dyn InputBackend>,
    pub capabilities: Capabilities,
}

impl HostDevices {
    /// Detect the screen and input devices; failures degrade to "absent".
    pub fn detect() -> Self {
        let capturer = match GdiCapturer::new() {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("screen capture unavailable: {e}");
                None
            }
        };
        let (input, has_input): (Box<dyn InputBackend>, bool) = match SendInputBackend::new() {
            Ok(b) => (Box::new(b), true),
            Err(e) => {
                warn!("input injection unavailable: {e}");
                (Box::new(UnavailableBackend::new(e.detail())), false)
            }
        };
        let capabilities = Capabilities {
            capture: capturer.is_some(),
            input: has_input,
        };
        Self {
            capturer,
            input,
            capabilities,
        }
    }
}

// ── AgentService ─────────────────────────────────────────────────

pub struct AgentService {
    config: AgentConfig,
    running: Arc<AtomicBool>,
}

impl AgentService {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Clearing this flag stops every loop at its next check.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run until stopped.
    ///
    /// 1. Detects host devices.
    /// 2. Registers, retrying until the relay answers.
    /// 3. Spawns the capture loop (only if capture works) and the command loop.
    /// 4. Announces every id the session is given.
    /// 5. Waits for both loops to wind down.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let devices = HostDevices::detect();
        info!(
            capture = devices.capabilities.capture,
            input = devices.capabilities.input,
            "host capabilities"
        );
        self.run_with(devices).await
    }

    async fn run_with(&self, devices: HostDevices) -> Result<(), Box<dyn std::error::Error>> {
        let client = RelayClient::new(
            &self.config.relay.url,
            self.config.connect_timeout(),
            self.config.request_timeout(),
        )?;
        let relay: SharedRelay = Arc::new(client);
        info!("relay: {}", self.config.relay.url);

        let request = RegisterRequest {
            agent_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            ..RegisterRequest::for_host(devices.capabilities)
        };
        let session = Arc::new(AgentSession::new(
            relay.clone(),
            request,
            self.config.retry_base(),
            self.config.retry_max(),
            Arc::clone(&self.running),
        ));

        let Some(id) = session.establish().await else {
            info!("stopped before registration completed");
            return Ok(());
        };
        announce(&id);

        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        handles.push(self.spawn_announcer(&session, id));

        match devices.capturer {
            Some(capturer) => {
                let pipeline = CapturePipeline::new(capturer, self.config.encoder());
                let mut capture = CaptureService::new(
                    pipeline,
                    relay.clone(),
                    Arc::clone(&session),
                    self.config.to_capture_config(),
                    Arc::clone(&self.running),
                );
                handles.push(tokio::spawn(async move { capture.run().await }));
            }
            None => info!("capture loop disabled; controllers will see no frames"),
        }

        let mut commands = CommandService::new(
            CommandDispatcher::new(devices.input),
            relay,
            Arc::clone(&session),
            self.config.to_command_config(),
            Arc::clone(&self.running),
        );
        handles.push(tokio::spawn(async move { commands.run().await }));

        for handle in handles {
            if let Err(e) = handle.await {
                error!("agent task failed: {e}");
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("agent stopped");
        Ok(())
    }

    /// Print the banner again whenever recovery hands out a new id.
    fn spawn_announcer(&self, session: &AgentSession, first: SessionId) -> JoinHandle<()> {
        let mut ids = session.subscribe();
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            let mut last = first;
            while running.load(Ordering::SeqCst) {
                tokio::select! {
                    changed = ids.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let current = ids.borrow_and_update().clone();
                        if let Some(id) = current {
                            if id != last {
                                announce(&id);
                                last = id;
                            }
                        }
                    }
                    _ = tokio::time::sleep(std::time::Duration::from_millis(250)) => {}
                }
            }
        })
    }
}

fn announce(id: &SessionId) {
    println!();
    println!("  ┌──────────────────────────────┐");
    println!("  │  Session ID: {:<16}│", id.as_str());
    println!("  └──────────────────────────────┘");
    println!();
}
