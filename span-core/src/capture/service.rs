//! Agent-side capture loop.
//!
//! Drives a [`CapturePipeline`] at the configured frame rate and publishes
//! every changed frame to the relay. Failures never end the loop: an
//! unknown session triggers re-registration, anything else waits out a
//! backoff delay and tries the next tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::agent::AgentSession;
use crate::api::SharedRelay;
use crate::backoff::{Backoff, Recovery, recovery_for, sleep_while_running};
use crate::capture::pipeline::{CapturePipeline, TickOutcome};
use crate::capture::source::ScreenSource;
use crate::error::SpanError;
use crate::protocol::SessionId;
use crate::relay::PublishOutcome;

// ── CaptureServiceConfig ─────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CaptureServiceConfig {
    /// Target frames per second; fractional rates allowed (0.5 = one frame every 2 s).
    pub fps: f64,
    pub retry_base: Duration,
    pub retry_max: Duration,
}

impl Default for CaptureServiceConfig {
    fn default() -> Self {
        Self {
            fps: 1.0,
            retry_base: Duration::from_secs(2),
            retry_max: Duration::from_secs(30),
        }
    }
}

impl CaptureServiceConfig {
    pub fn frame_interval(&self) -> Duration {
        let fps = if self.fps.is_finite() && self.fps > 0.0 { self.fps } else { 1.0 };
        Duration::from_secs_f64(1.0 / fps)
    }
}

// ── CaptureService ───────────────────────────────────────────────

pub struct CaptureService<S> {
    pipeline: CapturePipeline<S>,
    relay: SharedRelay,
    session: Arc<AgentSession>,
    config: CaptureServiceConfig,
    running: Arc<AtomicBool>,
    frames_sent: u64,
}

impl<S: ScreenSource> CaptureService<S> {
    pub fn new(
        pipeline: CapturePipeline<S>,
        relay: SharedRelay,
        session: Arc<AgentSession>,
        config: CaptureServiceConfig,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pipeline,
            relay,
            session,
            config,
            running,
            frames_sent: 0,
        }
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Frames the relay accepted since start.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Run until the stop flag is cleared.
    pub async fn run(&mut self) {
        let interval = self.config.frame_interval();
        let mut backoff = Backoff::new(self.config.retry_base, self.config.retry_max);
        let mut last_session: Option<SessionId> = None;
        info!(interval_ms = interval.as_millis() as u64, "capture loop started");

        while self.running.load(Ordering::SeqCst) {
            let loop_start = Instant::now();

            let Some(id) = self.session.id() else {
                // Registration in progress elsewhere.
                if !sleep_while_running(interval, &self.running).await {
                    break;
                }
                continue;
            };
            if last_session.as_ref() != Some(&id) {
                // New session: its frame slot is empty, so resend even a static screen.
                self.pipeline.invalidate();
                last_session = Some(id.clone());
            }

            match self.tick(&id).await {
                Ok(()) => {
                    backoff.reset();
                    Self::pace(loop_start, interval, &self.running).await;
                }
                Err(e) => {
                    self.pipeline.invalidate();
                    match recovery_for(&e) {
                        Recovery::Reregister => {
                            self.session.recover(&id).await;
                        }
                        Recovery::Retry => {
                            let delay = backoff.next_delay();
                            warn!(
                                failures = backoff.failures(),
                                retry_in_ms = delay.as_millis() as u64,
                                "capture tick failed: {e}"
                            );
                            sleep_while_running(delay, &self.running).await;
                        }
                    }
                }
            }
        }

        info!(frames = self.frames_sent, "capture loop stopped");
    }

    /// One tick: capture, then publish if the screen changed.
    pub async fn tick(&mut self, id: &SessionId) -> Result<(), SpanError> {
        let frame = match self.pipeline.tick()? {
            TickOutcome::Unchanged => return Ok(()),
            TickOutcome::Frame(frame) => frame,
        };
        let timestamp = frame.source_timestamp;
        match self.relay.publish_frame(id, frame).await? {
            PublishOutcome::Stored => self.frames_sent += 1,
            PublishOutcome::Stale => debug!(timestamp, "relay kept a newer frame"),
        }
        Ok(())
    }

    /// Sleep for the remainder of the frame interval.
    async fn pace(loop_start: Instant, interval: Duration, running: &AtomicBool) {
        let elapsed = loop_start.elapsed();
        if elapsed < interval {
            sleep_while_running(interval - elapsed, running).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::encoder::FrameEncoder;
    use crate::capture::types::{PixelFormat, RawScreenFrame};
    use crate::protocol::{Capabilities, RegisterRequest};
    use crate::relay::RelayService;

    /// Alternates between two solid colours every `period` grabs.
    struct Blinking {
        grabs: u32,
        period: u32,
    }

    impl ScreenSource for Blinking {
        fn grab(&mut self) -> Result<RawScreenFrame, SpanError> {
            let fill = if (self.grabs / self.period) % 2 == 0 { 0x10 } else { 0xF0 };
            self.grabs += 1;
            Ok(RawScreenFrame::packed(8, 8, PixelFormat::Bgra8, vec![fill; 8 * 8 * 4]))
        }
    }

    async fn service(period: u32) -> (Arc<RelayService>, CaptureService<Blinking>) {
        let relay = Arc::new(RelayService::default());
        let running = Arc::new(AtomicBool::new(true));
        let session = Arc::new(AgentSession::new(
            relay.clone(),
            RegisterRequest::for_host(Capabilities { capture: true, input: false }),
            Duration::from_millis(1),
            Duration::from_millis(2),
            running.clone(),
        ));
        session.establish().await.unwrap();
        let pipeline = CapturePipeline::new(Blinking { grabs: 0, period }, FrameEncoder::new(8, 8, 50));
        let svc = CaptureService::new(
            pipeline,
            relay.clone(),
            session,
            CaptureServiceConfig::default(),
            running,
        );
        (relay, svc)
    }

    #[tokio::test]
    async fn unchanged_screens_are_not_republished() {
        let (relay, mut svc) = service(3).await;
        let id = svc.session.id().unwrap();
        for _ in 0..3 {
            svc.tick(&id).await.unwrap();
        }
        assert_eq!(svc.frames_sent(), 1);
        assert!(relay.fetch_frame(&id).unwrap().is_some());

        svc.tick(&id).await.unwrap();
        assert_eq!(svc.frames_sent(), 2);
    }

    #[tokio::test]
    async fn reaped_session_surfaces_unknown_session() {
        let (relay, mut svc) = service(1).await;
        let id = svc.session.id().unwrap();
        relay.reap_expired(Instant::now() + Duration::from_secs(3600));
        assert!(matches!(svc.tick(&id).await, Err(SpanError::UnknownSession(_))));
    }

    #[tokio::test]
    async fn run_exits_when_stopped() {
        let (relay, mut svc) = service(1).await;
        let stop = svc.stop_handle();
        let id = svc.session.id().unwrap();
        let handle = tokio::spawn(async move {
            svc.run().await;
            svc.frames_sent()
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.store(false, Ordering::SeqCst);
        let sent = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(sent >= 1);
        assert!(relay.fetch_frame(&id).unwrap().is_some());
    }
}
