//! One capture tick: grab → change-detect → resize → encode.
//!
//! ```text
//! Idle ──► Capturing ──┬──► Unchanged ──► Idle
//!                      └──► Encoding ───► Idle
//! ```
//!
//! The pipeline is synchronous and owns no I/O; the capture service
//! drives it on a timer and hands produced frames to the relay.

use chrono::Utc;
use tracing::{debug, trace};

use crate::capture::encoder::FrameEncoder;
use crate::capture::fingerprint::ChangeDetector;
use crate::capture::source::ScreenSource;
use crate::error::SpanError;
use crate::protocol::Frame;

// ── PipelineState ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Capturing,
    Unchanged,
    Encoding,
}

/// What one tick produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Screen identical to the last frame sent; nothing to transmit.
    Unchanged,
    /// A new encoded frame.
    Frame(Frame),
}

// ── SourceClock ──────────────────────────────────────────────────

/// Producer clock in Unix milliseconds, forced strictly increasing so the
/// relay's ordering guard never drops our own frames after a clock step.
#[derive(Debug, Default)]
pub struct SourceClock {
    last: u64,
}

impl SourceClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u64 {
        let wall = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        self.last = wall.max(self.last + 1);
        self.last
    }
}

// ── CapturePipeline ──────────────────────────────────────────────

pub struct CapturePipeline<S> {
    source: S,
    detector: ChangeDetector,
    encoder: FrameEncoder,
    clock: SourceClock,
    state: PipelineState,
}

impl<S: ScreenSource> CapturePipeline<S> {
    pub fn new(source: S, encoder: FrameEncoder) -> Self {
        Self {
            source,
            detector: ChangeDetector::new(),
            encoder,
            clock: SourceClock::new(),
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Force the next tick to transmit even if the screen is unchanged.
    ///
    /// Called when a frame could not be delivered, or the session changed.
    pub fn invalidate(&mut self) {
        self.detector.reset();
    }

    /// Run one tick. Always ends back in [`PipelineState::Idle`].
    pub fn tick(&mut self) -> Result<TickOutcome, SpanError> {
        let result = self.run_stages();
        self.transition(PipelineState::Idle);
        result
    }

    fn run_stages(&mut self) -> Result<TickOutcome, SpanError> {
        self.transition(PipelineState::Capturing);
        let raw = self.source.grab()?;

        let (fingerprint, changed) = self.detector.check(&raw);
        if !changed {
            self.transition(PipelineState::Unchanged);
            return Ok(TickOutcome::Unchanged);
        }

        self.transition(PipelineState::Encoding);
        let encoded = self.encoder.encode(&raw)?;
        // Only a successfully encoded frame counts as sent.
        self.detector.commit(fingerprint);

        let timestamp = self.clock.next();
        debug!(
            bytes = encoded.data.len(),
            width = encoded.width,
            height = encoded.height,
            timestamp,
            "encoded frame"
        );
        Ok(TickOutcome::Frame(Frame::new(
            encoded.data,
            timestamp,
            encoded.width,
            encoded.height,
        )))
    }

    fn transition(&mut self, next: PipelineState) {
        trace!(from = ?self.state, to = ?next, "capture pipeline");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::capture::types::{PixelFormat, RawScreenFrame};

    /// Replays scripted grabs.
    struct Scripted(VecDeque<Result<RawScreenFrame, SpanError>>);

    impl ScreenSource for Scripted {
        fn grab(&mut self) -> Result<RawScreenFrame, SpanError> {
            self.0
                .pop_front()
                .unwrap_or_else(|| Err(SpanError::CaptureUnavailable("script exhausted".into())))
        }
    }

    fn screen(fill: u8) -> Result<RawScreenFrame, SpanError> {
        Ok(RawScreenFrame::packed(32, 32, PixelFormat::Bgra8, vec![fill; 32 * 32 * 4]))
    }

    fn pipeline(script: Vec<Result<RawScreenFrame, SpanError>>) -> CapturePipeline<Scripted> {
        CapturePipeline::new(Scripted(script.into()), FrameEncoder::new(16, 16, 50))
    }

    #[test]
    fn static_screen_is_sent_once() {
        let mut p = pipeline(vec![screen(1), screen(1), screen(1)]);
        assert!(matches!(p.tick().unwrap(), TickOutcome::Frame(_)));
        assert_eq!(p.tick().unwrap(), TickOutcome::Unchanged);
        assert_eq!(p.tick().unwrap(), TickOutcome::Unchanged);
        assert_eq!(p.state(), PipelineState::Idle);
    }

    #[test]
    fn changed_screen_gets_increasing_timestamps() {
        let mut p = pipeline(vec![screen(1), screen(2)]);
        let TickOutcome::Frame(a) = p.tick().unwrap() else { panic!("expected frame") };
        let TickOutcome::Frame(b) = p.tick().unwrap() else { panic!("expected frame") };
        assert!(b.source_timestamp > a.source_timestamp);
        assert_eq!((a.width, a.height), (16, 16));
    }

    #[test]
    fn capture_failure_returns_to_idle() {
        let mut p = pipeline(vec![Err(SpanError::CaptureUnavailable("locked".into())), screen(1)]);
        assert!(matches!(p.tick(), Err(SpanError::CaptureUnavailable(_))));
        assert_eq!(p.state(), PipelineState::Idle);
        assert!(matches!(p.tick().unwrap(), TickOutcome::Frame(_)));
    }

    #[test]
    fn invalidate_resends_static_screen() {
        let mut p = pipeline(vec![screen(4), screen(4)]);
        p.tick().unwrap();
        p.invalidate();
        assert!(matches!(p.tick().unwrap(), TickOutcome::Frame(_)));
    }

    #[test]
    fn source_clock_is_strictly_increasing() {
        let mut clock = SourceClock::new();
        let mut prev = clock.next();
        for _ in 0..1000 {
            let ts = clock.next();
            assert!(ts > prev);
            prev = ts;
        }
    }
}
