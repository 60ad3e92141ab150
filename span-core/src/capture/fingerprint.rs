//! Whole-frame change detection.
//!
//! Each grab is reduced to a blake3 digest of its visible pixels (row
//! padding excluded) plus its dimensions. A frame whose digest matches the
//! last one sent is not re-encoded or transmitted, so a static screen costs
//! nothing beyond the polling floor.

use crate::capture::types::RawScreenFrame;

/// Content digest of one raw frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint(blake3::Hash);

impl Fingerprint {
    pub fn of(frame: &RawScreenFrame) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&frame.width.to_le_bytes());
        hasher.update(&frame.height.to_le_bytes());
        for y in 0..frame.height {
            if let Some(row) = frame.row(y) {
                hasher.update(row);
            }
        }
        Self(hasher.finalize())
    }
}

/// Remembers the fingerprint of the last frame handed to the transport.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last_sent: Option<Fingerprint>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint `frame` and report whether it differs from the last commit.
    pub fn check(&self, frame: &RawScreenFrame) -> (Fingerprint, bool) {
        let fp = Fingerprint::of(frame);
        let changed = self.last_sent != Some(fp);
        (fp, changed)
    }

    /// Record `fp` as delivered.
    pub fn commit(&mut self, fp: Fingerprint) {
        self.last_sent = Some(fp);
    }

    /// Forget the last frame so the next one is always sent.
    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}
