//! Controller side: watch a session's frames, send it input.
//!
//! [`ControllerLoop`] polls the relay for the latest frame and hands it to a
//! [`FrameSurface`] only when it differs from the last one drawn.
//! [`CommandSender`] turns local [`ViewEvent`]s into commands. Pointer
//! positions are normalized against the [`Viewport`] the frame is drawn
//! in, never against the remote screen; the agent does the remapping.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::api::SharedRelay;
use crate::backoff::{Backoff, sleep_while_running};
use crate::error::SpanError;
use crate::protocol::{Command, Frame, KeyAction, MouseButton, PointerAction, SessionId, SystemAction};

// ── FrameSurface ─────────────────────────────────────────────────

/// Where a controller draws frames.
pub trait FrameSurface: Send {
    fn render(&mut self, frame: &Frame) -> Result<(), SpanError>;

    /// The relay no longer knows the session.
    fn session_lost(&mut self, id: &SessionId);
}

// ── Viewport ─────────────────────────────────────────────────────

/// Bounding box of the drawn frame, in local UI coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// A viewport that shows a frame 1:1 at the origin.
    pub fn native(frame: &Frame) -> Self {
        Self::new(0.0, 0.0, f64::from(frame.width), f64::from(frame.height))
    }

    /// Map a local point into `[0,1]×[0,1]`. `None` when the point lies
    /// outside the frame or the viewport is empty.
    pub fn normalize(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return None;
        }
        let nx = (x - self.left) / self.width;
        let ny = (y - self.top) / self.height;
        ((0.0..=1.0).contains(&nx) && (0.0..=1.0).contains(&ny)).then_some((nx, ny))
    }
}

// ── ViewEvent ────────────────────────────────────────────────────

/// Local UI input, in viewport coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    PointerMove { x: f64, y: f64 },
    PointerDown { x: f64, y: f64, button: MouseButton },
    PointerUp { x: f64, y: f64, button: MouseButton },
    Click { x: f64, y: f64, button: MouseButton },
    DoubleClick { x: f64, y: f64, button: MouseButton },
    Wheel { delta_y: i32 },
    KeyDown(String),
    KeyUp(String),
    /// Tap a named key or type a short text run.
    KeyPress(String),
    Text(String),
    Gesture(SystemAction),
}

impl ViewEvent {
    /// The command for this event, or `None` if it has no remote effect
    /// (pointer outside the frame, empty text).
    pub fn translate(&self, viewport: &Viewport) -> Option<Command> {
        let pointer = |action: PointerAction, x: f64, y: f64, button: MouseButton| {
            viewport.normalize(x, y).map(|(nx, ny)| Command::Pointer {
                action,
                x: nx,
                y: ny,
                button,
                delta_y: 0,
            })
        };
        let key = |action: KeyAction, k: &str| (!k.is_empty()).then(|| Command::key(action, k));

        match self {
            ViewEvent::PointerMove { x, y } => {
                pointer(PointerAction::Move, *x, *y, MouseButton::Left)
            }
            ViewEvent::PointerDown { x, y, button } => pointer(PointerAction::Down, *x, *y, *button),
            ViewEvent::PointerUp { x, y, button } => pointer(PointerAction::Up, *x, *y, *button),
            ViewEvent::Click { x, y, button } => pointer(PointerAction::Click, *x, *y, *button),
            ViewEvent::DoubleClick { x, y, button } => {
                pointer(PointerAction::DoubleClick, *x, *y, *button)
            }
            ViewEvent::Wheel { delta_y } => (*delta_y != 0).then(|| Command::scroll(*delta_y)),
            ViewEvent::KeyDown(k) => key(KeyAction::Keydown, k),
            ViewEvent::KeyUp(k) => key(KeyAction::Keyup, k),
            ViewEvent::KeyPress(k) => key(KeyAction::Press, k),
            ViewEvent::Text(t) => key(KeyAction::Type, t),
            ViewEvent::Gesture(action) => Some(Command::system(*action)),
        }
    }
}

// ── CommandSender ────────────────────────────────────────────────

/// Cloneable handle for enqueueing commands to one session.
#[derive(Clone)]
pub struct CommandSender {
    relay: SharedRelay,
    session: SessionId,
}

impl CommandSender {
    pub fn new(relay: SharedRelay, session: SessionId) -> Self {
        Self { relay, session }
    }

    /// Translate and enqueue. Returns whether a command was sent.
    pub async fn send(&self, event: &ViewEvent, viewport: &Viewport) -> Result<bool, SpanError> {
        let Some(command) = event.translate(viewport) else {
            debug!(?event, "event has no remote effect");
            return Ok(false);
        };
        self.send_command(command).await?;
        Ok(true)
    }

    pub async fn send_command(&self, command: Command) -> Result<(), SpanError> {
        debug!(session = %self.session, command = %command.label(), "enqueue");
        self.relay.enqueue_command(&self.session, command).await
    }
}

// ── ControllerLoop ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub poll_interval: Duration,
    pub retry_base: Duration,
    pub retry_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            retry_base: Duration::from_secs(1),
            retry_max: Duration::from_secs(10),
        }
    }
}

pub struct ControllerLoop<F> {
    relay: SharedRelay,
    session: SessionId,
    surface: F,
    config: ControllerConfig,
    running: Arc<AtomicBool>,
    /// `(sourceTimestamp, receivedAt)` of the last frame drawn.
    last_drawn: Option<(u64, DateTime<Utc>)>,
}

impl<F: FrameSurface> ControllerLoop<F> {
    pub fn new(
        relay: SharedRelay,
        session: SessionId,
        surface: F,
        config: ControllerConfig,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            relay,
            session,
            surface,
            config,
            running,
            last_drawn: None,
        }
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender::new(Arc::clone(&self.relay), self.session.clone())
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn surface(&self) -> &F {
        &self.surface
    }

    /// Fetch once; draw if the frame is new. Returns whether it drew.
    pub async fn poll_once(&mut self) -> Result<bool, SpanError> {
        let Some(frame) = self.relay.fetch_frame(&self.session).await? else {
            return Ok(false);
        };
        let stamp = (frame.source_timestamp, frame.received_at);
        if self.last_drawn == Some(stamp) {
            return Ok(false);
        }
        self.surface.render(&frame)?;
        self.last_drawn = Some(stamp);
        Ok(true)
    }

    /// Poll until stopped. Ends with [`SpanError::UnknownSession`] once the
    /// session is gone; every other failure is retried.
    pub async fn run(&mut self) -> Result<(), SpanError> {
        let mut backoff = Backoff::new(self.config.retry_base, self.config.retry_max);
        info!(session = %self.session, "watching session");

        while self.running.load(Ordering::SeqCst) {
            let loop_start = Instant::now();
            match self.poll_once().await {
                Ok(_) => {
                    backoff.reset();
                    let elapsed = loop_start.elapsed();
                    if elapsed < self.config.poll_interval {
                        sleep_while_running(self.config.poll_interval - elapsed, &self.running)
                            .await;
                    }
                }
                Err(SpanError::UnknownSession(id)) => {
                    warn!(session = %self.session, "session not found or expired");
                    self.surface.session_lost(&self.session);
                    return Err(SpanError::UnknownSession(id));
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        failures = backoff.failures(),
                        retry_in_ms = delay.as_millis() as u64,
                        "frame poll failed: {e}"
                    );
                    sleep_while_running(delay, &self.running).await;
                }
            }
        }
        Ok(())
    }
}
