//! Session identity, registration payloads and session summaries.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

// ── SessionId ─────────────────────────────────────────────────────

/// Short, human-transcribable session token.
///
/// Ids are uppercase ASCII alphanumerics. Anything a user types back in
/// is trimmed and upper-cased before lookup, so `ab12cd` and `AB12CD`
/// name the same session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Normalize a caller-supplied id.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_uppercase())
    }

    /// Draw a fresh random id of `len` characters.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Self {
        let id: String = rng
            .sample_iter(&Alphanumeric)
            .take(len.max(1))
            .map(|c| char::from(c).to_ascii_uppercase())
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

// ── Capabilities ──────────────────────────────────────────────────

/// Host abilities an agent declares when it registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// The agent can grab screen frames.
    #[serde(alias = "has_pil")]
    pub capture: bool,
    /// The agent can inject pointer and keyboard input.
    #[serde(alias = "has_pynput")]
    pub input: bool,
}

// ── Registration ──────────────────────────────────────────────────

/// Body of `POST /api/register`.
///
/// Capabilities may arrive nested under `capabilities` or as the flat
/// `has_pil` / `has_pynput` flags older agents send at the top level; a
/// flat flag wins over its nested twin. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RegisterWire")]
pub struct RegisterRequest {
    /// Host platform string, e.g. `windows` or `linux`.
    pub platform: String,
    pub capabilities: Capabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
}

/// Every shape `RegisterRequest` is accepted in.
#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RegisterWire {
    platform: String,
    capabilities: Capabilities,
    agent_version: Option<String>,
    #[serde(rename = "has_pil")]
    has_pil: Option<bool>,
    #[serde(rename = "has_pynput")]
    has_pynput: Option<bool>,
}

impl From<RegisterWire> for RegisterRequest {
    fn from(wire: RegisterWire) -> Self {
        Self {
            platform: wire.platform,
            capabilities: Capabilities {
                capture: wire.has_pil.unwrap_or(wire.capabilities.capture),
                input: wire.has_pynput.unwrap_or(wire.capabilities.input),
            },
            agent_version: wire.agent_version,
        }
    }
}

impl RegisterRequest {
    /// Describe the current host.
    pub fn for_host(capabilities: Capabilities) -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            capabilities,
            agent_version: None,
        }
    }
}

/// Response to a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub session_id: SessionId,
}

// ── Summaries ─────────────────────────────────────────────────────

/// Snapshot of one live session, as returned by `ListSessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub platform: String,
    pub capabilities: Capabilities,
    pub registered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Whether the frame store currently holds a frame for this session.
    pub has_frame: bool,
    /// Commands waiting for the agent to drain.
    pub pending_commands: usize,
}
