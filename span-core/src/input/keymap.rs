//! Logical key names → physical keys.
//!
//! Controllers send browser-style names (`Enter`, `ArrowUp`, `Control`).
//! Lookup is case-insensitive and accepts the usual short aliases. Anything
//! that is not a named key is either a single character (chordable) or a
//! text run (typed verbatim).

use crate::error::SpanError;

/// A physical key the input backend can press and release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    // Editing
    Enter,
    Escape,
    Backspace,
    Tab,
    Space,
    Delete,
    Insert,
    // Navigation
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    // Modifiers
    Shift,
    Control,
    Alt,
    Meta,
    CapsLock,
    /// Function key `F1`..=`F12`.
    F(u8),
    /// Any single printable character.
    Char(char),
}

const NAMED: &[(&str, Key)] = &[
    ("enter", Key::Enter),
    ("return", Key::Enter),
    ("escape", Key::Escape),
    ("esc", Key::Escape),
    ("backspace", Key::Backspace),
    ("tab", Key::Tab),
    ("space", Key::Space),
    ("spacebar", Key::Space),
    ("delete", Key::Delete),
    ("del", Key::Delete),
    ("insert", Key::Insert),
    ("ins", Key::Insert),
    ("arrowup", Key::Up),
    ("up", Key::Up),
    ("arrowdown", Key::Down),
    ("down", Key::Down),
    ("arrowleft", Key::Left),
    ("left", Key::Left),
    ("arrowright", Key::Right),
    ("right", Key::Right),
    ("home", Key::Home),
    ("end", Key::End),
    ("pageup", Key::PageUp),
    ("pgup", Key::PageUp),
    ("pagedown", Key::PageDown),
    ("pgdn", Key::PageDown),
    ("shift", Key::Shift),
    ("control", Key::Control),
    ("ctrl", Key::Control),
    ("alt", Key::Alt),
    ("option", Key::Alt),
    ("meta", Key::Meta),
    ("win", Key::Meta),
    ("super", Key::Meta),
    ("os", Key::Meta),
    ("capslock", Key::CapsLock),
];

/// Look up a named key, case-insensitively.
///
/// Single characters are never treated as names, so `"a"` stays a character.
pub fn lookup(name: &str) -> Option<Key> {
    if name.chars().count() < 2 {
        return None;
    }
    let lower = name.to_ascii_lowercase();
    if let Some(&(_, key)) = NAMED.iter().find(|(n, _)| *n == lower) {
        return Some(key);
    }
    let n: u8 = lower.strip_prefix('f')?.parse().ok()?;
    (1..=12).contains(&n).then_some(Key::F(n))
}

/// What a key command's `key` field refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyTarget {
    /// A named key or single character that can be held down.
    Key(Key),
    /// A run of text with no key identity of its own.
    Text(String),
}

pub fn resolve(raw: &str) -> KeyTarget {
    if let Some(key) = lookup(raw) {
        return KeyTarget::Key(key);
    }
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(' '), None) => KeyTarget::Key(Key::Space),
        (Some(c), None) => KeyTarget::Key(Key::Char(c)),
        _ => KeyTarget::Text(raw.to_string()),
    }
}

/// Resolve a key that must be holdable (keydown/keyup).
pub fn resolve_holdable(raw: &str) -> Result<Key, SpanError> {
    match resolve(raw) {
        KeyTarget::Key(key) => Ok(key),
        KeyTarget::Text(_) => Err(SpanError::InvalidTarget(format!(
            "'{raw}' is neither a named key nor a single character"
        ))),
    }
}
