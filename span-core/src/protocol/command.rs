//! Input commands queued by controllers and drained by agents.
//!
//! # Wire shape
//!
//! ```text
//! {"type":"pointer","action":"click","x":0.1,"y":0.1,"button":"left"}
//! {"type":"pointer","action":"scroll","deltaY":-240}
//! {"type":"key","action":"keydown","key":"Shift"}
//! {"type":"key","action":"type","key":"hello"}
//! {"type":"system","action":"switch_window"}
//! ```
//!
//! The historical tags `mouse`, `keyboard` and `special` (and the gesture
//! names `alt-tab`, `ctrl-alt-del`) are still accepted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SpanError;

// ── Command ───────────────────────────────────────────────────────

/// One discrete input instruction for an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    /// Pointer action at normalized coordinates in `[0,1]×[0,1]`.
    #[serde(alias = "mouse")]
    Pointer {
        action: PointerAction,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default)]
        button: MouseButton,
        /// Wheel delta in browser units (120 per notch).
        #[serde(default, rename = "deltaY")]
        delta_y: i32,
    },

    /// Keyboard action on a named key, a single character or a text run.
    #[serde(alias = "keyboard")]
    Key { action: KeyAction, key: String },

    /// Composite gesture from a closed set.
    #[serde(alias = "special")]
    System { action: SystemAction },
}

impl Command {
    pub fn pointer(action: PointerAction, x: f64, y: f64) -> Self {
        Command::Pointer {
            action,
            x,
            y,
            button: MouseButton::Left,
            delta_y: 0,
        }
    }

    pub fn click(x: f64, y: f64, button: MouseButton) -> Self {
        Command::Pointer {
            action: PointerAction::Click,
            x,
            y,
            button,
            delta_y: 0,
        }
    }

    pub fn scroll(delta_y: i32) -> Self {
        Command::Pointer {
            action: PointerAction::Scroll,
            x: 0.0,
            y: 0.0,
            button: MouseButton::Left,
            delta_y,
        }
    }

    pub fn key(action: KeyAction, key: impl Into<String>) -> Self {
        Command::Key {
            action,
            key: key.into(),
        }
    }

    pub fn system(action: SystemAction) -> Self {
        Command::System { action }
    }

    /// Reject payloads no agent could act on.
    ///
    /// Coordinates outside `[0,1]` are allowed here (the dispatcher clamps
    /// them) but must be finite.
    pub fn validate(&self) -> Result<(), SpanError> {
        match self {
            Command::Pointer { x, y, .. } if !x.is_finite() || !y.is_finite() => Err(
                SpanError::MalformedPayload("pointer coordinates must be finite".into()),
            ),
            Command::Key { key, .. } if key.is_empty() => {
                Err(SpanError::MalformedPayload("key command without a key".into()))
            }
            _ => Ok(()),
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        match self {
            Command::Pointer { action, .. } => format!("pointer/{action:?}"),
            Command::Key { action, .. } => format!("key/{action:?}"),
            Command::System { action } => format!("system/{action:?}"),
        }
    }
}

// ── Verbs ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerAction {
    Move,
    Click,
    #[serde(alias = "dblclick")]
    DoubleClick,
    Down,
    Up,
    Scroll,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    /// Press and hold; pair with `keyup` for chords.
    Keydown,
    Keyup,
    /// Press and release a named key, or type a text run.
    Press,
    /// Type the text verbatim.
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemAction {
    /// Alt+Tab.
    #[serde(alias = "alt-tab")]
    SwitchWindow,
    /// Meta+D.
    #[serde(alias = "show-desktop")]
    ShowDesktop,
    /// Ctrl+Alt+Del. Always refused by agents.
    #[serde(alias = "ctrl-alt-del")]
    SecureAttention,
}

// ── QueuedCommand ─────────────────────────────────────────────────

/// A command as stored in, and drained from, a session's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedCommand {
    pub enqueued_at: DateTime<Utc>,
    pub command: Command,
}

impl QueuedCommand {
    pub fn now(command: Command) -> Self {
        Self {
            enqueued_at: Utc::now(),
            command,
        }
    }
}
