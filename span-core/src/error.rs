//! Error taxonomy shared by the relay, the agent and the controller.
//!
//! Every fallible operation in span returns `Result<T, SpanError>`.
//! Relay-side store operations report [`SpanError::UnknownSession`] and
//! [`SpanError::MalformedPayload`] straight back to the caller; the
//! polling loops recover locally from everything else.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The canonical error type for span.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpanError {
    // ── Relay Errors ─────────────────────────────────────────────
    /// The session id does not name a live session (never issued, or reaped).
    #[error("session not found or expired: {0}")]
    UnknownSession(String),

    /// A request body or command could not be understood.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The id space, the session cap or a queue cap was exhausted.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    // ── Host Capability Errors ───────────────────────────────────
    /// The host cannot produce screen captures.
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// The host cannot inject pointer or keyboard input.
    #[error("injection unavailable: {0}")]
    InjectionUnavailable(String),

    /// The input target (key name, coordinates) is not valid on this host.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Downscaling or image encoding failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    // ── Network Errors ───────────────────────────────────────────
    /// Timeout, refused connection or an upstream 5xx.
    #[error("transient network failure: {0}")]
    TransientNetwork(String),
}

impl SpanError {
    /// Short machine-readable name used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            SpanError::UnknownSession(_) => "unknown_session",
            SpanError::MalformedPayload(_) => "malformed_payload",
            SpanError::ResourceExhausted(_) => "resource_exhausted",
            SpanError::CaptureUnavailable(_) => "capture_unavailable",
            SpanError::InjectionUnavailable(_) => "injection_unavailable",
            SpanError::InvalidTarget(_) => "invalid_target",
            SpanError::Encoding(_) => "encoding",
            SpanError::TransientNetwork(_) => "transient_network",
        }
    }

    /// The variant's payload without the display prefix.
    pub fn detail(&self) -> &str {
        match self {
            SpanError::UnknownSession(s)
            | SpanError::MalformedPayload(s)
            | SpanError::ResourceExhausted(s)
            | SpanError::CaptureUnavailable(s)
            | SpanError::InjectionUnavailable(s)
            | SpanError::InvalidTarget(s)
            | SpanError::Encoding(s)
            | SpanError::TransientNetwork(s) => s,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SpanError::TransientNetwork(_)
                | SpanError::CaptureUnavailable(_)
                | SpanError::ResourceExhausted(_)
        )
    }
}

// ── ErrorBody ────────────────────────────────────────────────────

/// JSON body of every non-2xx relay response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// [`SpanError::kind`].
    pub error: String,
    /// [`SpanError::detail`].
    pub message: String,
}

impl ErrorBody {
    pub fn from_error(err: &SpanError) -> Self {
        Self {
            error: err.kind().to_string(),
            message: err.detail().to_string(),
        }
    }

    /// Rebuild the error on the client side. Unknown kinds are treated as
    /// malformed responses.
    pub fn into_error(self) -> SpanError {
        let ErrorBody { error, message } = self;
        match error.as_str() {
            "unknown_session" => SpanError::UnknownSession(message),
            "malformed_payload" => SpanError::MalformedPayload(message),
            "resource_exhausted" => SpanError::ResourceExhausted(message),
            "capture_unavailable" => SpanError::CaptureUnavailable(message),
            "injection_unavailable" => SpanError::InjectionUnavailable(message),
            "invalid_target" => SpanError::InvalidTarget(message),
            "encoding" => SpanError::Encoding(message),
            "transient_network" => SpanError::TransientNetwork(message),
            other => SpanError::MalformedPayload(format!("unrecognised error kind '{other}': {message}")),
        }
    }
}

impl From<serde_json::Error> for SpanError {
    fn from(e: serde_json::Error) -> Self {
        SpanError::MalformedPayload(e.to_string())
    }
}

impl From<base64::DecodeError> for SpanError {
    fn from(e: base64::DecodeError) -> Self {
        SpanError::MalformedPayload(format!("frame data is not base64: {e}"))
    }
}

impl From<image::ImageError> for SpanError {
    fn from(e: image::ImageError) -> Self {
        SpanError::Encoding(e.to_string())
    }
}

impl From<reqwest::Error> for SpanError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SpanError::MalformedPayload(e.to_string())
        } else {
            SpanError::TransientNetwork(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = SpanError::UnknownSession("AB12CD".into());
        assert!(e.to_string().contains("not found or expired"));
        assert!(e.to_string().contains("AB12CD"));
    }

    #[test]
    fn transient_classification() {
        assert!(SpanError::TransientNetwork("timeout".into()).is_transient());
        assert!(!SpanError::UnknownSession("X".into()).is_transient());
        assert!(!SpanError::MalformedPayload("x".into()).is_transient());
    }

    #[test]
    fn error_body_survives_the_wire() {
        let original = SpanError::UnknownSession("AB12CD".into());
        let json = serde_json::to_string(&ErrorBody::from_error(&original)).unwrap();
        assert_eq!(json, r#"{"error":"unknown_session","message":"AB12CD"}"#);
        let body: ErrorBody = serde_json::from_str(&json).unwrap();
        assert_eq!(body.into_error(), original);
    }

    #[test]
    fn unrecognised_kind_is_malformed() {
        let body = ErrorBody {
            error: "teapot".into(),
            message: "short and stout".into(),
        };
        assert!(matches!(body.into_error(), SpanError::MalformedPayload(_)));
    }

    #[test]
    fn from_json_is_malformed() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let e: SpanError = err.into();
        assert_eq!(e.kind(), "malformed_payload");
    }
}
