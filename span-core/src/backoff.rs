//! Retry pacing and failure recovery for the polling loops.
//!
//! Loops never exit on a failed tick. They ask [`recovery_for`] what the
//! error calls for, wait [`Backoff::next_delay`] when retrying, and call
//! [`Backoff::reset`] after each successful tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::SpanError;

/// Longest uninterrupted sleep; bounds how late a loop notices a stop request.
const STOP_POLL: Duration = Duration::from_millis(100);

// ── Backoff ──────────────────────────────────────────────────────

/// Exponential backoff: `base`, `2·base`, `4·base`, … capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
        }
    }

    /// Delay to wait after one more failure.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.failures.min(16)).unwrap_or(u32::MAX);
        self.failures = self.failures.saturating_add(1);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Forget past failures.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

// ── Recovery ─────────────────────────────────────────────────────

/// How an agent loop reacts to a failed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The relay forgot our session: register again, then carry on.
    Reregister,
    /// Log, back off, retry the same tick later.
    Retry,
}

pub fn recovery_for(err: &SpanError) -> Recovery {
    match err {
        SpanError::UnknownSession(_) => Recovery::Reregister,
        SpanError::TransientNetwork(_)
        | SpanError::MalformedPayload(_)
        | SpanError::ResourceExhausted(_)
        | SpanError::CaptureUnavailable(_)
        | SpanError::InjectionUnavailable(_)
        | SpanError::InvalidTarget(_)
        | SpanError::Encoding(_) => Recovery::Retry,
    }
}

// ── Stoppable sleep ──────────────────────────────────────────────

/// Sleep for `duration`, waking early once `running` turns false.
///
/// Returns whether the loop should keep going.
pub async fn sleep_while_running(duration: Duration, running: &AtomicBool) -> bool {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let step = remaining.min(STOP_POLL);
        tokio::time::sleep(step).await;
        remaining -= step;
    }
    running.load(Ordering::SeqCst)
}
