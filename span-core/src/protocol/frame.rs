//! Screen frames and their JSON wire forms.
//!
//! Internally a frame payload is raw encoded image bytes ([`Bytes`], so a
//! fetch is a refcount bump). On the wire the payload travels as base64.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::SpanError;
use crate::protocol::session::SessionId;

// ── Frame ─────────────────────────────────────────────────────────

/// One encoded screen capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Encoded image bytes (JPEG from the capture pipeline; opaque to the relay).
    pub payload: Bytes,
    /// Producer clock, milliseconds. Strictly increasing per agent.
    pub source_timestamp: u64,
    /// Relay clock at the moment the frame was stored.
    pub received_at: DateTime<Utc>,
    /// Encoded image width in pixels.
    pub width: u32,
    /// Encoded image height in pixels.
    pub height: u32,
}

impl Frame {
    pub fn new(payload: impl Into<Bytes>, source_timestamp: u64, width: u32, height: u32) -> Self {
        Self {
            payload: payload.into(),
            source_timestamp,
            received_at: Utc::now(),
            width,
            height,
        }
    }

    /// Wire view returned to controllers.
    pub fn to_view(&self) -> FrameView {
        FrameView {
            image: STANDARD.encode(&self.payload),
            source_timestamp: self.source_timestamp,
            received_at: self.received_at,
            width: self.width,
            height: self.height,
        }
    }
}

// ── PublishFrameRequest ───────────────────────────────────────────

/// Body of `POST /api/screen`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishFrameRequest {
    pub session_id: SessionId,
    /// Base64 encoded image.
    pub data: String,
    /// Producer clock, milliseconds. Fractional values are truncated.
    #[serde(deserialize_with = "millis")]
    pub timestamp: u64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// Accept an integer or a finite non-negative float millisecond count.
fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Whole(u64),
        Fractional(f64),
    }

    match Millis::deserialize(deserializer)? {
        Millis::Whole(ms) => Ok(ms),
        Millis::Fractional(ms) if ms.is_finite() && ms >= 0.0 && ms < u64::MAX as f64 => {
            Ok(ms.trunc() as u64)
        }
        Millis::Fractional(ms) => Err(serde::de::Error::custom(format!(
            "timestamp {ms} is not a non-negative millisecond count"
        ))),
    }
}

impl PublishFrameRequest {
    pub fn from_frame(session_id: SessionId, frame: &Frame) -> Self {
        Self {
            session_id,
            data: STANDARD.encode(&frame.payload),
            timestamp: frame.source_timestamp,
            width: frame.width,
            height: frame.height,
        }
    }

    /// Decode into a store-ready [`Frame`] stamped with the relay clock.
    pub fn into_frame(self) -> Result<(SessionId, Frame), SpanError> {
        let payload = STANDARD.decode(self.data.as_bytes())?;
        if payload.is_empty() {
            return Err(SpanError::MalformedPayload("empty frame".into()));
        }
        let frame = Frame::new(payload, self.timestamp, self.width, self.height);
        Ok((self.session_id, frame))
    }
}

/// Acknowledgement for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishAck {
    pub success: bool,
    /// `false` when the frame was older than the stored one and dropped.
    pub accepted: bool,
}

// ── Fetch ─────────────────────────────────────────────────────────

/// Wire form of a stored frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameView {
    /// Base64 encoded image.
    pub image: String,
    pub source_timestamp: u64,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

impl FrameView {
    pub fn into_frame(self) -> Result<Frame, SpanError> {
        let payload = STANDARD.decode(self.image.as_bytes())?;
        Ok(Frame {
            payload: Bytes::from(payload),
            source_timestamp: self.source_timestamp,
            received_at: self.received_at,
            width: self.width,
            height: self.height,
        })
    }
}

/// Response of `GET /api/screen/{id}`; `frame` is `null` until the first publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchFrameResponse {
    pub frame: Option<FrameView>,
}
