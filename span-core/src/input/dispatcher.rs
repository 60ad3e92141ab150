//! Executes drained commands against an [`InputBackend`].
//!
//! Commands run strictly in order, each in isolation: a failed or refused
//! command is logged and counted, and the batch moves on. Pointer
//! coordinates arrive normalized to `[0,1]` and are remapped here, against
//! the display size queried fresh for every command.

use tracing::{debug, warn};

use crate::error::SpanError;
use crate::input::backend::{DisplaySize, InputBackend};
use crate::input::keymap::{self, Key, KeyTarget};
use crate::protocol::{
    Command, KeyAction, MouseButton, PointerAction, QueuedCommand, SystemAction,
};

/// Wheel units per notch in browser `WheelEvent.deltaY`.
const WHEEL_UNITS_PER_NOTCH: i32 = 120;

// ── Pure helpers ─────────────────────────────────────────────────

/// Map normalized `(x, y)` onto `display`, clamped to the last pixel.
///
/// `(0.5, 0.5)` on 1920×1080 is `(960, 540)`.
pub fn remap(x: f64, y: f64, display: DisplaySize) -> Result<(u32, u32), SpanError> {
    if display.width == 0 || display.height == 0 {
        return Err(SpanError::InvalidTarget(format!(
            "display reports {}x{}",
            display.width, display.height
        )));
    }
    if !x.is_finite() || !y.is_finite() {
        return Err(SpanError::InvalidTarget("non-finite pointer coordinates".into()));
    }
    let axis = |v: f64, len: u32| -> u32 {
        let max = f64::from(len - 1);
        (v * f64::from(len)).floor().clamp(0.0, max) as u32
    };
    Ok((axis(x, display.width), axis(y, display.height)))
}

/// Convert a wheel delta into notches; positive deltaY scrolls down.
///
/// Any non-zero delta moves at least one notch.
pub fn wheel_notches(delta_y: i32) -> i32 {
    let notches = -(delta_y / WHEEL_UNITS_PER_NOTCH);
    if notches == 0 && delta_y != 0 {
        -delta_y.signum()
    } else {
        notches
    }
}

// ── DispatchReport ───────────────────────────────────────────────

/// Per-batch tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub executed: usize,
    pub refused: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.executed + self.refused + self.failed
    }
}

/// Result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Executed,
    /// Deliberately not performed.
    Refused,
}

// ── CommandDispatcher ────────────────────────────────────────────

pub struct CommandDispatcher<B> {
    backend: B,
}

impl<B: InputBackend> CommandDispatcher<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run a drained batch in arrival order.
    pub fn dispatch_all(&mut self, batch: &[QueuedCommand]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for queued in batch {
            match self.dispatch(&queued.command) {
                Ok(DispatchOutcome::Executed) => report.executed += 1,
                Ok(DispatchOutcome::Refused) => report.refused += 1,
                Err(e) => {
                    warn!(command = %queued.command.label(), "command failed: {e}");
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub fn dispatch(&mut self, command: &Command) -> Result<DispatchOutcome, SpanError> {
        debug!(command = %command.label(), "dispatching");
        match command {
            Command::Pointer {
                action,
                x,
                y,
                button,
                delta_y,
            } => self.pointer(*action, *x, *y, *button, *delta_y),
            Command::Key { action, key } => self.key(*action, key),
            Command::System { action } => self.system(*action),
        }
    }

    fn pointer(
        &mut self,
        action: PointerAction,
        x: f64,
        y: f64,
        button: MouseButton,
        delta_y: i32,
    ) -> Result<DispatchOutcome, SpanError> {
        if action == PointerAction::Scroll {
            let notches = wheel_notches(delta_y);
            if notches != 0 {
                self.backend.scroll(notches)?;
            }
            return Ok(DispatchOutcome::Executed);
        }

        let display = self.backend.display_size()?;
        let (px, py) = remap(x, y, display)?;
        self.backend.move_pointer(px, py)?;
        match action {
            PointerAction::Move | PointerAction::Scroll => {}
            PointerAction::Click => self.backend.click(button)?,
            PointerAction::DoubleClick => {
                self.backend.click(button)?;
                self.backend.click(button)?;
            }
            PointerAction::Down => self.backend.button(button, true)?,
            PointerAction::Up => self.backend.button(button, false)?,
        }
        Ok(DispatchOutcome::Executed)
    }

    fn key(&mut self, action: KeyAction, raw: &str) -> Result<DispatchOutcome, SpanError> {
        match action {
            KeyAction::Keydown => self.backend.press_key(keymap::resolve_holdable(raw)?)?,
            KeyAction::Keyup => self.backend.release_key(keymap::resolve_holdable(raw)?)?,
            KeyAction::Press => match keymap::resolve(raw) {
                KeyTarget::Key(key) => self.tap(key)?,
                KeyTarget::Text(text) => self.backend.type_text(&text)?,
            },
            KeyAction::Type => self.backend.type_text(raw)?,
        }
        Ok(DispatchOutcome::Executed)
    }

    fn system(&mut self, action: SystemAction) -> Result<DispatchOutcome, SpanError> {
        match action {
            SystemAction::SwitchWindow => self.chord(&[Key::Alt, Key::Tab])?,
            SystemAction::ShowDesktop => self.chord(&[Key::Meta, Key::Char('d')])?,
            SystemAction::SecureAttention => {
                warn!("secure attention sequence requested; refusing to send it");
                return Ok(DispatchOutcome::Refused);
            }
        }
        Ok(DispatchOutcome::Executed)
    }

    fn tap(&mut self, key: Key) -> Result<(), SpanError> {
        self.backend.press_key(key)?;
        self.backend.release_key(key)
    }

    /// Press `keys` in order, release in reverse. Keys already pressed are
    /// released even if a later press fails.
    fn chord(&mut self, keys: &[Key]) -> Result<(), SpanError> {
        let mut held = Vec::with_capacity(keys.len());
        let mut result = Ok(());
        for &key in keys {
            if let Err(e) = self.backend.press_key(key) {
                result = Err(e);
                break;
            }
            held.push(key);
        }
        for &key in held.iter().rev() {
            let released = self.backend.release_key(key);
            if result.is_ok() {
                result = released;
            }
        }
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records every backend call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Event {
        Move(u32, u32),
        Button(MouseButton, bool),
        Scroll(i32),
        Press(Key),
        Release(Key),
        Type(String),
    }

    pub(crate) struct Recorder {
        pub size: DisplaySize,
        pub events: Vec<Event>,
        /// Keys whose press fails.
        pub broken: Vec<Key>,
    }

    impl Recorder {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                size: DisplaySize { width, height },
                events: Vec::new(),
                broken: Vec::new(),
            }
        }
    }

    impl InputBackend for Recorder {
        fn display_size(&self) -> Result<DisplaySize, SpanError> {
            Ok(self.size)
        }
        fn move_pointer(&mut self, x: u32, y: u32) -> Result<(), SpanError> {
            self.events.push(Event::Move(x, y));
            Ok(())
        }
        fn button(&mut self, button: MouseButton, down: bool) -> Result<(), SpanError> {
            self.events.push(Event::Button(button, down));
            Ok(())
        }
        fn scroll(&mut self, notches: i32) -> Result<(), SpanError> {
            self.events.push(Event::Scroll(notches));
            Ok(())
        }
        fn press_key(&mut self, key: Key) -> Result<(), SpanError> {
            if self.broken.contains(&key) {
                return Err(SpanError::InvalidTarget(format!("{key:?}")));
            }
            self.events.push(Event::Press(key));
            Ok(())
        }
        fn release_key(&mut self, key: Key) -> Result<(), SpanError> {
            self.events.push(Event::Release(key));
            Ok(())
        }
        fn type_text(&mut self, text: &str) -> Result<(), SpanError> {
            self.events.push(Event::Type(text.to_string()));
            Ok(())
        }
    }

    fn fhd() -> DisplaySize {
        DisplaySize {
            width: 1920,
            height: 1080,
        }
    }

    #[test]
    fn remap_centre_of_full_hd() {
        assert_eq!(remap(0.5, 0.5, fhd()).unwrap(), (960, 540));
    }

    #[test]
    fn remap_clamps_to_display() {
        assert_eq!(remap(1.0, 1.0, fhd()).unwrap(), (1919, 1079));
        assert_eq!(remap(-0.3, 7.0, fhd()).unwrap(), (0, 1079));
    }

    #[test]
    fn remap_rejects_empty_display() {
        let empty = DisplaySize { width: 0, height: 1080 };
        assert!(matches!(remap(0.5, 0.5, empty), Err(SpanError::InvalidTarget(_))));
    }

    #[test]
    fn wheel_notches_invert_and_round_away_from_zero() {
        assert_eq!(wheel_notches(240), -2);
        assert_eq!(wheel_notches(-120), 1);
        assert_eq!(wheel_notches(60), -1);
        assert_eq!(wheel_notches(-1), 1);
        assert_eq!(wheel_notches(0), 0);
    }

    #[test]
    fn click_moves_then_clicks() {
        let mut d = CommandDispatcher::new(Recorder::new(1920, 1080));
        d.dispatch(&Command::click(0.1, 0.1, MouseButton::Right)).unwrap();
        assert_eq!(
            d.backend().events,
            [
                Event::Move(192, 108),
                Event::Button(MouseButton::Right, true),
                Event::Button(MouseButton::Right, false),
            ]
        );
    }

    #[test]
    fn display_size_is_queried_per_command() {
        let mut d = CommandDispatcher::new(Recorder::new(1920, 1080));
        d.dispatch(&Command::pointer(PointerAction::Move, 0.5, 0.5)).unwrap();
        d.backend.size = DisplaySize { width: 800, height: 600 };
        d.dispatch(&Command::pointer(PointerAction::Move, 0.5, 0.5)).unwrap();
        assert_eq!(d.backend().events, [Event::Move(960, 540), Event::Move(400, 300)]);
    }

    #[test]
    fn keydown_keyup_chord_across_commands() {
        let mut d = CommandDispatcher::new(Recorder::new(10, 10));
        for cmd in [
            Command::key(KeyAction::Keydown, "Control"),
            Command::key(KeyAction::Keydown, "c"),
            Command::key(KeyAction::Keyup, "c"),
            Command::key(KeyAction::Keyup, "Control"),
        ] {
            d.dispatch(&cmd).unwrap();
        }
        assert_eq!(
            d.backend().events,
            [
                Event::Press(Key::Control),
                Event::Press(Key::Char('c')),
                Event::Release(Key::Char('c')),
                Event::Release(Key::Control),
            ]
        );
    }

    #[test]
    fn press_taps_named_keys_and_types_text() {
        let mut d = CommandDispatcher::new(Recorder::new(10, 10));
        d.dispatch(&Command::key(KeyAction::Press, "Enter")).unwrap();
        d.dispatch(&Command::key(KeyAction::Press, "hi there")).unwrap();
        d.dispatch(&Command::key(KeyAction::Type, "Enter")).unwrap();
        assert_eq!(
            d.backend().events,
            [
                Event::Press(Key::Enter),
                Event::Release(Key::Enter),
                Event::Type("hi there".into()),
                Event::Type("Enter".into()),
            ]
        );
    }

    #[test]
    fn switch_window_is_alt_tab() {
        let mut d = CommandDispatcher::new(Recorder::new(10, 10));
        d.dispatch(&Command::system(SystemAction::SwitchWindow)).unwrap();
        assert_eq!(
            d.backend().events,
            [
                Event::Press(Key::Alt),
                Event::Press(Key::Tab),
                Event::Release(Key::Tab),
                Event::Release(Key::Alt),
            ]
        );
    }

    #[test]
    fn secure_attention_is_refused_without_input() {
        let mut d = CommandDispatcher::new(Recorder::new(10, 10));
        let outcome = d.dispatch(&Command::system(SystemAction::SecureAttention)).unwrap();
        assert_eq!(outcome, DispatchOutcome::Refused);
        assert!(d.backend().events.is_empty());
    }

    #[test]
    fn failed_chord_releases_held_keys() {
        let mut rec = Recorder::new(10, 10);
        rec.broken.push(Key::Tab);
        let mut d = CommandDispatcher::new(rec);
        assert!(d.dispatch(&Command::system(SystemAction::SwitchWindow)).is_err());
        assert_eq!(
            d.backend().events,
            [Event::Press(Key::Alt), Event::Release(Key::Alt)]
        );
    }

    #[test]
    fn one_failure_does_not_stop_the_batch() {
        let mut d = CommandDispatcher::new(Recorder::new(100, 100));
        let batch: Vec<QueuedCommand> = [
            Command::key(KeyAction::Keydown, "not a key"),
            Command::system(SystemAction::SecureAttention),
            Command::click(0.5, 0.5, MouseButton::Left),
        ]
        .into_iter()
        .map(QueuedCommand::now)
        .collect();

        let report = d.dispatch_all(&batch);
        assert_eq!(
            report,
            DispatchReport {
                executed: 1,
                refused: 1,
                failed: 1
            }
        );
        assert_eq!(report.total(), 3);
        assert_eq!(d.backend().events[0], Event::Move(50, 50));
    }
}
