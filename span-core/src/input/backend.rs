//! Host input injection.
//!
//! [`InputBackend`] is the capability seam between the dispatcher and the
//! OS. Coordinates reaching a backend are already in display pixels; the
//! dispatcher does all remapping and clamping.
//!
//! On Windows, [`SendInputBackend`] replays events through Win32
//! `SendInput`. Elsewhere [`UnavailableBackend`] reports
//! [`SpanError::InjectionUnavailable`] for every action, which the agent
//! detects at start-up and registers with `input: false`.

use crate::error::SpanError;
use crate::input::keymap::Key;
use crate::protocol::MouseButton;

/// Pixel size of the primary display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

/// Anything that can inject pointer and keyboard input.
pub trait InputBackend: Send {
    /// Current display geometry. Queried per command; never cache it.
    fn display_size(&self) -> Result<DisplaySize, SpanError>;

    fn move_pointer(&mut self, x: u32, y: u32) -> Result<(), SpanError>;

    /// Press (`down = true`) or release a button at the current position.
    fn button(&mut self, button: MouseButton, down: bool) -> Result<(), SpanError>;

    /// Wheel notches; positive scrolls content up.
    fn scroll(&mut self, notches: i32) -> Result<(), SpanError>;

    fn press_key(&mut self, key: Key) -> Result<(), SpanError>;

    fn release_key(&mut self, key: Key) -> Result<(), SpanError>;

    /// Type `text` verbatim, independent of keyboard layout.
    fn type_text(&mut self, text: &str) -> Result<(), SpanError>;

    /// Full press + release of `button`.
    fn click(&mut self, button: MouseButton) -> Result<(), SpanError> {
        self.button(button, true)?;
        self.button(button, false)
    }
}

impl<B: InputBackend + ?Sized> InputBackend for Box<B> {
    fn display_size(&self) -> Result<DisplaySize, SpanError> {
        (**self).display_size()
    }
    fn move_pointer(&mut self, x: u32, y: u32) -> Result<(), SpanError> {
        (**self).move_pointer(x, y)
    }
    fn button(&mut self, button: MouseButton, down: bool) -> Result<(), SpanError> {
        (**self).button(button, down)
    }
    fn scroll(&mut self, notches: i32) -> Result<(), SpanError> {
        (**self).scroll(notches)
    }
    fn press_key(&mut self, key: Key) -> Result<(), SpanError> {
        (**self).press_key(key)
    }
    fn release_key(&mut self, key: Key) -> Result<(), SpanError> {
        (**self).release_key(key)
    }
    fn type_text(&mut self, text: &str) -> Result<(), SpanError> {
        (**self).type_text(text)
    }
    fn click(&mut self, button: MouseButton) -> Result<(), SpanError> {
        (**self).click(button)
    }
}

// ── UnavailableBackend ───────────────────────────────────────────

/// Backend for hosts without input injection.
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn fail<T>(&self) -> Result<T, SpanError> {
        Err(SpanError::InjectionUnavailable(self.reason.clone()))
    }
}

impl InputBackend for UnavailableBackend {
    fn display_size(&self) -> Result<DisplaySize, SpanError> {
        self.fail()
    }
    fn move_pointer(&mut self, _x: u32, _y: u32) -> Result<(), SpanError> {
        self.fail()
    }
    fn button(&mut self, _button: MouseButton, _down: bool) -> Result<(), SpanError> {
        self.fail()
    }
    fn scroll(&mut self, _notches: i32) -> Result<(), SpanError> {
        self.fail()
    }
    fn press_key(&mut self, _key: Key) -> Result<(), SpanError> {
        self.fail()
    }
    fn release_key(&mut self, _key: Key) -> Result<(), SpanError> {
        self.fail()
    }
    fn type_text(&mut self, _text: &str) -> Result<(), SpanError> {
        self.fail()
    }
}

// ── SendInputBackend ─────────────────────────────────────────────

/// Win32 `SendInput` injector.
///
/// Requires the agent to run in the interactive desktop session.
pub struct SendInputBackend {
    _private: (),
}

/// Whether a printable key goes out as its virtual key rather than as a
/// Unicode event. A VK carries no shift state, so only characters the
/// unshifted key produces qualify.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn uses_virtual_key(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit()
}

#[cfg(target_os = "windows")]
mod platform {
    use super::*;
    use windows::Win32::UI::Input::KeyboardAndMouse::*;
    use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

    /// One wheel notch in Win32 units.
    const WHEEL_DELTA: i32 = 120;

    impl SendInputBackend {
        pub fn new() -> Result<Self, SpanError> {
            let size = screen_size()?;
            tracing::debug!(width = size.width, height = size.height, "SendInput backend ready");
            Ok(Self { _private: () })
        }
    }

    fn screen_size() -> Result<DisplaySize, SpanError> {
        let (w, h) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
        if w <= 0 || h <= 0 {
            return Err(SpanError::InjectionUnavailable(
                "no interactive desktop in this session".into(),
            ));
        }
        Ok(DisplaySize {
            width: w as u32,
            height: h as u32,
        })
    }

    fn send(inputs: &[INPUT]) -> Result<(), SpanError> {
        let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
        if sent as usize != inputs.len() {
            return Err(SpanError::InjectionUnavailable(format!(
                "SendInput accepted {sent} of {} events",
                inputs.len()
            )));
        }
        Ok(())
    }

    fn mouse(dx: i32, dy: i32, data: i32, flags: MOUSE_EVENT_FLAGS) -> INPUT {
        INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx,
                    dy,
                    mouseData: data as u32,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        }
    }

    fn keyboard(vk: u16, scan: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
        INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(vk),
                    wScan: scan,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        }
    }

    /// Virtual key for `key`, or `None` for characters sent as Unicode.
    fn virtual_key(key: Key) -> Option<(VIRTUAL_KEY, bool)> {
        let vk = match key {
            Key::Enter => (VK_RETURN, false),
            Key::Escape => (VK_ESCAPE, false),
            Key::Backspace => (VK_BACK, false),
            Key::Tab => (VK_TAB, false),
            Key::Space => (VK_SPACE, false),
            Key::Delete => (VK_DELETE, true),
            Key::Insert => (VK_INSERT, true),
            Key::Up => (VK_UP, true),
            Key::Down => (VK_DOWN, true),
            Key::Left => (VK_LEFT, true),
            Key::Right => (VK_RIGHT, true),
            Key::Home => (VK_HOME, true),
            Key::End => (VK_END, true),
            Key::PageUp => (VK_PRIOR, true),
            Key::PageDown => (VK_NEXT, true),
            Key::Shift => (VK_SHIFT, false),
            Key::Control => (VK_CONTROL, false),
            Key::Alt => (VK_MENU, false),
            Key::Meta => (VK_LWIN, true),
            Key::CapsLock => (VK_CAPITAL, false),
            Key::F(n) => (VIRTUAL_KEY(VK_F1.0 + u16::from(n - 1)), false),
            // Letters and digits share their ASCII code with the VK code.
            Key::Char(c) if uses_virtual_key(c) => {
                (VIRTUAL_KEY(c.to_ascii_uppercase() as u16), false)
            }
            Key::Char(_) => return None,
        };
        Some(vk)
    }

    fn key_event(key: Key, up: bool) -> Result<Vec<INPUT>, SpanError> {
        let release = if up { KEYEVENTF_KEYUP } else { KEYBD_EVENT_FLAGS(0) };
        if let Some((vk, extended)) = virtual_key(key) {
            let flags = if extended { release | KEYEVENTF_EXTENDEDKEY } else { release };
            return Ok(vec![keyboard(vk.0, 0, flags)]);
        }
        let Key::Char(c) = key else {
            return Err(SpanError::InvalidTarget(format!("no virtual key for {key:?}")));
        };
        let mut units = [0u16; 2];
        Ok(c.encode_utf16(&mut units)
            .iter()
            .map(|&unit| keyboard(0, unit, KEYEVENTF_UNICODE | release))
            .collect())
    }

    impl InputBackend for SendInputBackend {
        fn display_size(&self) -> Result<DisplaySize, SpanError> {
            screen_size()
        }

        fn move_pointer(&mut self, x: u32, y: u32) -> Result<(), SpanError> {
            let size = screen_size()?;
            // Absolute coordinates are normalized to 0..=65535.
            let abs_x = (i64::from(x) * 65535 / i64::from(size.width.max(2) - 1)) as i32;
            let abs_y = (i64::from(y) * 65535 / i64::from(size.height.max(2) - 1)) as i32;
            send(&[mouse(abs_x, abs_y, 0, MOUSEEVENTF_MOVE | MOUSEEVENTF_ABSOLUTE)])
        }

        fn button(&mut self, button: MouseButton, down: bool) -> Result<(), SpanError> {
            let flags = match (button, down) {
                (MouseButton::Left, true) => MOUSEEVENTF_LEFTDOWN,
                (MouseButton::Left, false) => MOUSEEVENTF_LEFTUP,
                (MouseButton::Right, true) => MOUSEEVENTF_RIGHTDOWN,
                (MouseButton::Right, false) => MOUSEEVENTF_RIGHTUP,
                (MouseButton::Middle, true) => MOUSEEVENTF_MIDDLEDOWN,
                (MouseButton::Middle, false) => MOUSEEVENTF_MIDDLEUP,
            };
            send(&[mouse(0, 0, 0, flags)])
        }

        fn scroll(&mut self, notches: i32) -> Result<(), SpanError> {
            send(&[mouse(0, 0, notches.saturating_mul(WHEEL_DELTA), MOUSEEVENTF_WHEEL)])
        }

        fn press_key(&mut self, key: Key) -> Result<(), SpanError> {
            send(&key_event(key, false)?)
        }

        fn release_key(&mut self, key: Key) -> Result<(), SpanError> {
            send(&key_event(key, true)?)
        }

        fn type_text(&mut self, text: &str) -> Result<(), SpanError> {
            let inputs: Vec<INPUT> = text
                .encode_utf16()
                .flat_map(|unit| {
                    [
                        keyboard(0, unit, KEYEVENTF_UNICODE),
                        keyboard(0, unit, KEYEVENTF_UNICODE | KEYEVENTF_KEYUP),
                    ]
                })
                .collect();
            if inputs.is_empty() {
                return Ok(());
            }
            send(&inputs)
        }
    }
}

#[cfg(not(target_os = "windows"))]
impl SendInputBackend {
    pub fn new() -> Result<Self, SpanError> {
        Err(SpanError::InjectionUnavailable(
            "input injection is only implemented for Windows".into(),
        ))
    }
}

#[cfg(not(target_os = "windows"))]
impl InputBackend for SendInputBackend {
    fn display_size(&self) -> Result<DisplaySize, SpanError> {
        Err(SpanError::InjectionUnavailable("not supported on this platform".into()))
    }
    fn move_pointer(&mut self, _x: u32, _y: u32) -> Result<(), SpanError> {
        Err(SpanError::InjectionUnavailable("not supported on this platform".into()))
    }
    fn button(&mut self, _button: MouseButton, _down: bool) -> Result<(), SpanError> {
        Err(SpanError::InjectionUnavailable("not supported on this platform".into()))
    }
    fn scroll(&mut self, _notches: i32) -> Result<(), SpanError> {
        Err(SpanError::InjectionUnavailable("not supported on this platform".into()))
    }
    fn press_key(&mut self, _key: Key) -> Result<(), SpanError> {
        Err(SpanError::InjectionUnavailable("not supported on this platform".into()))
    }
    fn release_key(&mut self, _key: Key) -> Result<(), SpanError> {
        Err(SpanError::InjectionUnavailable("not supported on this platform".into()))
    }
    fn type_text(&mut self, _text: &str) -> Result<(), SpanError> {
        Err(SpanError::InjectionUnavailable("not supported on this platform".into()))
    }
}
