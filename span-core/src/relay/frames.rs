//! Single-slot frame cache, one slot per session.

use dashmap::DashMap;
use tracing::debug;

use crate::error::SpanError;
use crate::protocol::{Frame, SessionId};

/// What happened to a published frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The frame replaced the slot contents.
    Stored,
    /// The frame was older than the stored one and was dropped.
    Stale,
}

impl PublishOutcome {
    pub fn accepted(self) -> bool {
        matches!(self, PublishOutcome::Stored)
    }
}

/// Replace-only store: a slot holds at most one frame at any instant.
pub struct FrameStore {
    slots: DashMap<SessionId, Option<Frame>>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Create an empty slot for a newly registered session.
    pub fn create(&self, id: &SessionId) {
        self.slots.insert(id.clone(), None);
    }

    /// Destroy `id`'s slot unless `is_live` says the id still names a
    /// session. Returns whether a slot was removed.
    pub fn discard_orphan(&self, id: &SessionId, is_live: impl Fn(&SessionId) -> bool) -> bool {
        self.slots.remove_if(id, |key, _| !is_live(key)).is_some()
    }

    /// Overwrite the slot unless `frame` is older than what it holds.
    ///
    /// Equal source timestamps replace: a producer that republishes with the
    /// same clock value is still the newest data.
    pub fn publish(&self, id: &SessionId, frame: Frame) -> Result<PublishOutcome, SpanError> {
        let mut slot = self
            .slots
            .get_mut(id)
            .ok_or_else(|| SpanError::UnknownSession(id.to_string()))?;

        if let Some(current) = slot.value().as_ref() {
            if frame.source_timestamp < current.source_timestamp {
                debug!(
                    session = %id,
                    stored = current.source_timestamp,
                    incoming = frame.source_timestamp,
                    "dropping out-of-order frame"
                );
                return Ok(PublishOutcome::Stale);
            }
        }

        *slot.value_mut() = Some(frame);
        Ok(PublishOutcome::Stored)
    }

    /// Current frame, `Ok(None)` before the first publish. Never blocks on a producer.
    pub fn fetch(&self, id: &SessionId) -> Result<Option<Frame>, SpanError> {
        self.slots
            .get(id)
            .map(|slot| slot.value().clone())
            .ok_or_else(|| SpanError::UnknownSession(id.to_string()))
    }

    pub fn has_frame(&self, id: &SessionId) -> bool {
        self.slots.get(id).is_some_and(|slot| slot.value().is_some())
    }
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ts: u64, byte: u8) -> Frame {
        Frame::new(vec![byte; 4], ts, 8, 8)
    }

    #[test]
    fn fetch_before_publish_is_none() {
        let store = FrameStore::new();
        let id = SessionId::new("AB12");
        store.create(&id);
        assert_eq!(store.fetch(&id).unwrap(), None);
        assert!(!store.has_frame(&id));
    }

    #[test]
    fn increasing_publishes_keep_the_last() {
        let store = FrameStore::new();
        let id = SessionId::new("AB12");
        store.create(&id);
        for ts in 1..=5u64 {
            assert_eq!(store.publish(&id, frame(ts, ts as u8)).unwrap(), PublishOutcome::Stored);
        }
        let got = store.fetch(&id).unwrap().unwrap();
        assert_eq!(got.source_timestamp, 5);
        assert_eq!(got.payload.as_ref(), &[5u8; 4]);
    }

    #[test]
    fn older_frame_is_rejected() {
        let store = FrameStore::new();
        let id = SessionId::new("AB12");
        store.create(&id);
        store.publish(&id, frame(100, 1)).unwrap();

        assert_eq!(store.publish(&id, frame(50, 2)).unwrap(), PublishOutcome::Stale);
        let got = store.fetch(&id).unwrap().unwrap();
        assert_eq!(got.source_timestamp, 100);
        assert_eq!(got.payload.as_ref(), &[1u8; 4]);
    }

    #[test]
    fn equal_timestamp_replaces() {
        let store = FrameStore::new();
        let id = SessionId::new("EQ");
        store.create(&id);
        store.publish(&id, frame(7, 1)).unwrap();
        assert!(store.publish(&id, frame(7, 2)).unwrap().accepted());
        assert_eq!(store.fetch(&id).unwrap().unwrap().payload.as_ref(), &[2u8; 4]);
    }

    #[test]
    fn unknown_session_is_reported() {
        let store = FrameStore::new();
        let id = SessionId::new("NONE");
        assert!(matches!(store.fetch(&id), Err(SpanError::UnknownSession(_))));
        assert!(matches!(
            store.publish(&id, frame(1, 1)),
            Err(SpanError::UnknownSession(_))
        ));
    }

    #[test]
    fn discard_orphan_respects_liveness() {
        let store = FrameStore::new();
        let id = SessionId::new("SLOT");
        store.create(&id);
        store.publish(&id, frame(3, 3)).unwrap();

        assert!(!store.discard_orphan(&id, |k| k == &id));
        assert_eq!(store.fetch(&id).unwrap().unwrap().source_timestamp, 3);

        assert!(store.discard_orphan(&id, |_| false));
        assert!(matches!(store.fetch(&id), Err(SpanError::UnknownSession(_))));
    }
}
