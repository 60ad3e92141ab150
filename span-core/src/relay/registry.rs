//! Session registry: id allocation, liveness and expiry.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::error::SpanError;
use crate::protocol::{Capabilities, RegisterRequest, SessionId};

/// Consecutive id collisions tolerated before registration gives up.
const MAX_ID_ATTEMPTS: usize = 16;

// ── SessionRecord ────────────────────────────────────────────────

/// Liveness record for one registered agent.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: SessionId,
    pub platform: String,
    pub capabilities: Capabilities,
    pub registered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Monotonic twin of `last_seen_at`, used for expiry.
    last_seen: Instant,
}

impl SessionRecord {
    fn new(id: SessionId, info: RegisterRequest, now: Instant) -> Self {
        let wall = Utc::now();
        Self {
            id,
            platform: info.platform,
            capabilities: info.capabilities,
            registered_at: wall,
            last_seen_at: wall,
            last_seen: now,
        }
    }

    /// Time since the agent last called in, measured at `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

// ── SessionRegistry ──────────────────────────────────────────────

/// Concurrent map of live sessions.
///
/// Sharded locking: operations on different sessions do not contend.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionRecord>,
    id_length: usize,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(id_length: usize, max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            id_length: id_length.max(1),
            max_sessions,
        }
    }

    /// Allocate a fresh id and store `info` under it.
    ///
    /// Fails with [`SpanError::ResourceExhausted`] when the session cap is
    /// reached or the id space is saturated.
    pub fn register(&self, info: RegisterRequest, now: Instant) -> Result<SessionId, SpanError> {
        if self.sessions.len() >= self.max_sessions {
            return Err(SpanError::ResourceExhausted(format!(
                "session limit of {} reached",
                self.max_sessions
            )));
        }

        let mut rng = rand::thread_rng();
        for attempt in 0..MAX_ID_ATTEMPTS {
            let id = SessionId::generate(&mut rng, self.id_length);
            match self.sessions.entry(id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(SessionRecord::new(id.clone(), info, now));
                    return Ok(id);
                }
                Entry::Occupied(_) => {
                    debug!(%id, attempt, "session id collision; regenerating");
                }
            }
        }

        Err(SpanError::ResourceExhausted(format!(
            "no free session id after {MAX_ID_ATTEMPTS} attempts"
        )))
    }

    /// Refresh `last_seen_at` for a live session.
    ///
    /// A record already idle past `ttl` is treated as gone even if no sweep
    /// has removed it yet, so a late poll cannot revive an expired session.
    pub fn touch(&self, id: &SessionId, now: Instant, ttl: Duration) -> Result<(), SpanError> {
        let mut record = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SpanError::UnknownSession(id.to_string()))?;
        if record.idle_for(now) > ttl {
            return Err(SpanError::UnknownSession(id.to_string()));
        }
        record.last_seen = now;
        record.last_seen_at = Utc::now();
        Ok(())
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Snapshot of all live sessions, ordered by id.
    pub fn list(&self) -> Vec<SessionRecord> {
        let mut records: Vec<SessionRecord> =
            self.sessions.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Remove every session idle for longer than `ttl`; returns their ids.
    pub fn reap(&self, now: Instant, ttl: Duration) -> Vec<SessionId> {
        let mut reaped = Vec::new();
        self.sessions.retain(|id, record| {
            let keep = record.idle_for(now) <= ttl;
            if !keep {
                reaped.push(id.clone());
            }
            keep
        });
        reaped
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn info() -> RegisterRequest {
        RegisterRequest {
            platform: "linux".into(),
            capabilities: Capabilities {
                capture: true,
                input: false,
            },
            agent_version: None,
        }
    }

    #[test]
    fn register_issues_unique_ids() {
        let reg = SessionRegistry::new(6, 100);
        let now = Instant::now();
        let a = reg.register(info(), now).unwrap();
        let b = reg.register(info(), now).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 6);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn touch_unknown_session_fails() {
        let reg = SessionRegistry::new(6, 100);
        let err = reg.touch(&SessionId::new("NOPE"), Instant::now(), Duration::from_secs(60)).unwrap_err();
        assert!(matches!(err, SpanError::UnknownSession(_)));
    }

    #[test]
    fn session_cap_is_enforced() {
        let reg = SessionRegistry::new(6, 1);
        reg.register(info(), Instant::now()).unwrap();
        let err = reg.register(info(), Instant::now()).unwrap_err();
        assert!(matches!(err, SpanError::ResourceExhausted(_)));
    }

    #[test]
    fn saturated_id_space_reports_exhaustion() {
        // 36 possible one-character ids.
        let reg = SessionRegistry::new(1, 1000);
        let now = Instant::now();
        let mut issued = HashSet::new();
        let err = loop {
            match reg.register(info(), now) {
                Ok(id) => assert!(issued.insert(id), "id issued twice"),
                Err(e) => break e,
            }
        };
        assert!(matches!(err, SpanError::ResourceExhausted(_)));
        assert!(issued.len() <= 36);
        assert_eq!(issued.len(), reg.len());
    }

    #[test]
    fn reap_removes_only_idle_sessions() {
        let reg = SessionRegistry::new(6, 100);
        let t0 = Instant::now();
        let stale = reg.register(info(), t0).unwrap();
        let fresh = reg.register(info(), t0).unwrap();

        let ttl = Duration::from_secs(30);
        reg.touch(&fresh, t0 + Duration::from_secs(20), ttl).unwrap();

        let reaped = reg.reap(t0 + Duration::from_secs(45), ttl);
        assert_eq!(reaped, vec![stale.clone()]);
        assert!(!reg.contains(&stale));
        assert!(reg.contains(&fresh));
    }

    #[test]
    fn touch_refuses_a_record_past_its_ttl() {
        let reg = SessionRegistry::new(6, 100);
        let t0 = Instant::now();
        let id = reg.register(info(), t0).unwrap();
        let ttl = Duration::from_secs(30);

        reg.touch(&id, t0 + ttl, ttl).unwrap();
        let late = t0 + ttl + ttl + Duration::from_millis(1);
        assert!(matches!(reg.touch(&id, late, ttl), Err(SpanError::UnknownSession(_))));
        // Still present until swept, and the failed touch did not refresh it.
        assert!(reg.contains(&id));
        assert_eq!(reg.reap(late, ttl), vec![id]);
    }

    #[test]
    fn reap_keeps_session_exactly_at_ttl() {
        let reg = SessionRegistry::new(6, 100);
        let t0 = Instant::now();
        let id = reg.register(info(), t0).unwrap();
        let ttl = Duration::from_secs(10);
        assert!(reg.reap(t0 + ttl, ttl).is_empty());
        assert!(reg.contains(&id));
    }
}
