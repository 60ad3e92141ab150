//! Relay service: the single owner of the three session stores.
//!
//! The service is constructed once and shared (`Arc<RelayService>`) by
//! every request handler. Each store synchronises itself, so handlers for
//! different sessions never wait on each other.
//!
//! Expiry has no timer of its own: operations sweep sessions idle for
//! longer than the configured TTL, at most once per `reap_interval`, so
//! reaping rides on the polling traffic that already exists. Between sweeps
//! an expired record may linger, but it is never revived, listed or polled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::info;

use crate::api::RelayApi;
use crate::error::SpanError;
use crate::protocol::{
    Command, Frame, QueuedCommand, RegisterRequest, SessionId, SessionSummary,
};
use crate::relay::frames::{FrameStore, PublishOutcome};
use crate::relay::queue::CommandQueues;
use crate::relay::registry::SessionRegistry;

// ── RelayConfig ──────────────────────────────────────────────────

/// Tunables for [`RelayService`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Inactivity threshold after which a session is reaped.
    pub session_ttl: Duration,
    /// Length of issued session ids.
    pub id_length: usize,
    /// Upper bound on concurrently live sessions.
    pub max_sessions: usize,
    /// Per-session command queue cap (oldest dropped beyond it).
    pub queue_capacity: usize,
    /// Minimum spacing between expiry sweeps. Zero sweeps on every call.
    pub reap_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(30 * 60),
            id_length: 6,
            max_sessions: 1024,
            queue_capacity: 256,
            reap_interval: Duration::from_secs(1),
        }
    }
}

// ── RelayService ─────────────────────────────────────────────────

pub struct RelayService {
    registry: SessionRegistry,
    queues: CommandQueues,
    frames: FrameStore,
    config: RelayConfig,
    epoch: Instant,
    /// Milliseconds after `epoch` of the last sweep.
    last_sweep: AtomicU64,
}

impl RelayService {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            registry: SessionRegistry::new(config.id_length, config.max_sessions),
            queues: CommandQueues::new(config.queue_capacity),
            frames: FrameStore::new(),
            config,
            epoch: Instant::now(),
            last_sweep: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Register an agent. Its queue and frame slot are created with it.
    pub fn register(&self, request: RegisterRequest) -> Result<SessionId, SpanError> {
        let now = Instant::now();
        self.sweep(now);

        let platform = request.platform.clone();
        let capabilities = request.capabilities;
        let id = self.registry.register(request, now)?;
        self.queues.create(&id);
        self.frames.create(&id);

        info!(
            session = %id,
            %platform,
            capture = capabilities.capture,
            input = capabilities.input,
            "agent registered"
        );
        Ok(id)
    }

    /// Agent poll: refresh liveness, then take all pending commands.
    pub fn drain_commands(&self, id: &SessionId) -> Result<Vec<QueuedCommand>, SpanError> {
        let now = Instant::now();
        self.sweep(now);
        self.registry.touch(id, now, self.config.session_ttl)?;
        self.queues.drain_all(id)
    }

    /// Agent push: refresh liveness, then offer the frame to the store.
    pub fn publish_frame(&self, id: &SessionId, frame: Frame) -> Result<PublishOutcome, SpanError> {
        let now = Instant::now();
        self.sweep(now);
        self.registry.touch(id, now, self.config.session_ttl)?;
        self.frames.publish(id, frame)
    }

    /// Controller push: validate and queue a command.
    pub fn enqueue_command(&self, id: &SessionId, command: Command) -> Result<(), SpanError> {
        self.sweep(Instant::now());
        command.validate()?;
        self.queues.enqueue(id, QueuedCommand::now(command))?;
        Ok(())
    }

    /// Controller poll: latest frame for `id`.
    pub fn fetch_frame(&self, id: &SessionId) -> Result<Option<Frame>, SpanError> {
        self.sweep(Instant::now());
        self.frames.fetch(id)
    }

    /// Snapshot of live sessions.
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let now = Instant::now();
        self.sweep(now);
        self.registry
            .list()
            .into_iter()
            .filter(|record| record.idle_for(now) <= self.config.session_ttl)
            .map(|record| SessionSummary {
                has_frame: self.frames.has_frame(&record.id),
                pending_commands: self.queues.pending(&record.id).unwrap_or(0),
                id: record.id,
                platform: record.platform,
                capabilities: record.capabilities,
                registered_at: record.registered_at,
                last_seen_at: record.last_seen_at,
            })
            .collect()
    }

    /// Reap sessions idle at `now` for longer than the TTL, cascading to
    /// their queue and frame slot. Runs unconditionally.
    pub fn reap_expired(&self, now: Instant) -> Vec<SessionId> {
        let reaped = self.registry.reap(now, self.config.session_ttl);
        self.discard_reaped(&reaped);
        reaped
    }

    /// Reap, unless another caller swept within the last `reap_interval`.
    fn sweep(&self, now: Instant) {
        let interval = self.config.reap_interval.as_millis() as u64;
        let at = now.saturating_duration_since(self.epoch).as_millis() as u64;
        let last = self.last_sweep.load(Ordering::Acquire);
        if at < last.saturating_add(interval) {
            return;
        }
        // One winner per interval; losers skip rather than sweep twice.
        if self
            .last_sweep
            .compare_exchange(last, at, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.reap_expired(now);
        }
    }

    /// Drop the queue and frame slot of each reaped id, unless the id was
    /// registered again in the meantime.
    fn discard_reaped(&self, reaped: &[SessionId]) {
        for id in reaped {
            let discarded = self.queues.discard_orphan(id, |k| self.registry.contains(k));
            self.frames.discard_orphan(id, |k| self.registry.contains(k));
            info!(session = %id, discarded, "session expired");
        }
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }
}

impl Default for RelayService {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

#[async_trait]
impl RelayApi for RelayService {
    async fn register(&self, request: RegisterRequest) -> Result<SessionId, SpanError> {
        RelayService::register(self, request)
    }

    async fn drain_commands(&self, id: &SessionId) -> Result<Vec<QueuedCommand>, SpanError> {
        RelayService::drain_commands(self, id)
    }

    async fn publish_frame(&self, id: &SessionId, frame: Frame) -> Result<PublishOutcome, SpanError> {
        RelayService::publish_frame(self, id, frame)
    }

    async fn enqueue_command(&self, id: &SessionId, command: Command) -> Result<(), SpanError> {
        RelayService::enqueue_command(self, id, command)
    }

    async fn fetch_frame(&self, id: &SessionId) -> Result<Option<Frame>, SpanError> {
        RelayService::fetch_frame(self, id)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, SpanError> {
        Ok(RelayService::list_sessions(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Capabilities, KeyAction, MouseButton};

    fn agent() -> RegisterRequest {
        RegisterRequest::for_host(Capabilities {
            capture: true,
            input: true,
        })
    }

    fn service_with_ttl(ttl: Duration) -> RelayService {
        RelayService::new(RelayConfig {
            session_ttl: ttl,
            ..RelayConfig::default()
        })
    }

    fn scroll_deltas(drained: Vec<QueuedCommand>) -> Vec<i32> {
        drained
            .into_iter()
            .map(|q| match q.command {
                Command::Pointer { delta_y, .. } => delta_y,
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    #[test]
    fn fetch_before_publish_is_none_yet() {
        let relay = RelayService::default();
        let id = relay.register(agent()).unwrap();
        assert_eq!(relay.fetch_frame(&id).unwrap(), None);
    }

    #[test]
    fn enqueue_then_drain_preserves_order() {
        let relay = RelayService::default();
        let id = relay.register(agent()).unwrap();

        let cmds = vec![
            Command::click(0.1, 0.1, MouseButton::Left),
            Command::key(KeyAction::Type, "hi"),
            Command::scroll(-120),
        ];
        for c in &cmds {
            relay.enqueue_command(&id, c.clone()).unwrap();
        }

        let drained: Vec<Command> = relay
            .drain_commands(&id)
            .unwrap()
            .into_iter()
            .map(|q| q.command)
            .collect();
        assert_eq!(drained, cmds);
        assert!(relay.drain_commands(&id).unwrap().is_empty());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let relay = RelayService::default();
        let id = relay.register(agent()).unwrap();
        let typed = SessionId::new(id.as_str().to_ascii_lowercase());
        relay
            .enqueue_command(&typed, Command::key(KeyAction::Press, "Enter"))
            .unwrap();
        assert_eq!(relay.drain_commands(&id).unwrap().len(), 1);
    }

    #[test]
    fn invalid_command_is_malformed() {
        let relay = RelayService::default();
        let id = relay.register(agent()).unwrap();
        let err = relay
            .enqueue_command(&id, Command::click(f64::NAN, 0.5, MouseButton::Left))
            .unwrap_err();
        assert!(matches!(err, SpanError::MalformedPayload(_)));
    }

    #[test]
    fn reap_cascades_to_queue_and_frames() {
        let relay = service_with_ttl(Duration::from_secs(60));
        let id = relay.register(agent()).unwrap();
        relay.publish_frame(&id, Frame::new(vec![1, 2, 3], 1, 1, 1)).unwrap();
        relay
            .enqueue_command(&id, Command::key(KeyAction::Type, "x"))
            .unwrap();

        let reaped = relay.reap_expired(Instant::now() + Duration::from_secs(120));
        assert_eq!(reaped, vec![id.clone()]);

        assert!(matches!(
            relay.enqueue_command(&id, Command::key(KeyAction::Type, "y")),
            Err(SpanError::UnknownSession(_))
        ));
        assert!(matches!(relay.fetch_frame(&id), Err(SpanError::UnknownSession(_))));
        assert!(matches!(relay.drain_commands(&id), Err(SpanError::UnknownSession(_))));
        assert!(relay.list_sessions().is_empty());
    }

    #[test]
    fn agent_traffic_keeps_session_alive() {
        let relay = service_with_ttl(Duration::from_millis(200));
        let id = relay.register(agent()).unwrap();
        std::thread::sleep(Duration::from_millis(120));
        relay.drain_commands(&id).unwrap();
        std::thread::sleep(Duration::from_millis(120));
        // 240 ms since registration, 120 ms since the last poll.
        assert_eq!(relay.list_sessions().len(), 1);
    }

    #[test]
    fn list_reports_frame_presence_and_queue_depth() {
        let relay = RelayService::default();
        let with_frame = relay.register(agent()).unwrap();
        let without = relay.register(agent()).unwrap();
        relay
            .publish_frame(&with_frame, Frame::new(vec![9], 10, 1, 1))
            .unwrap();
        relay
            .enqueue_command(&without, Command::key(KeyAction::Type, "a"))
            .unwrap();

        let sessions = relay.list_sessions();
        let find = |id: &SessionId| sessions.iter().find(|s| &s.id == id).unwrap();
        assert!(find(&with_frame).has_frame);
        assert!(!find(&without).has_frame);
        assert_eq!(find(&without).pending_commands, 1);
    }

    #[test]
    fn cascade_spares_an_id_that_is_live_again() {
        let relay = RelayService::default();
        let id = relay.register(agent()).unwrap();
        relay.publish_frame(&id, Frame::new(vec![4], 4, 1, 1)).unwrap();
        relay
            .enqueue_command(&id, Command::key(KeyAction::Type, "kept"))
            .unwrap();

        // The registry reaped `id` and a new registration took it before
        // the cascade reached the other stores.
        relay.discard_reaped(std::slice::from_ref(&id));

        assert_eq!(relay.fetch_frame(&id).unwrap().unwrap().source_timestamp, 4);
        assert_eq!(relay.drain_commands(&id).unwrap().len(), 1);
        relay.enqueue_command(&id, Command::scroll(1)).unwrap();
        assert_eq!(relay.list_sessions()[0].pending_commands, 1);
    }

    #[test]
    fn sweeps_are_spaced_by_reap_interval() {
        let relay = RelayService::new(RelayConfig {
            session_ttl: Duration::from_millis(50),
            reap_interval: Duration::from_secs(600),
            ..RelayConfig::default()
        });
        let stale = relay.register(agent()).unwrap();
        std::thread::sleep(Duration::from_millis(80));
        relay.register(agent()).unwrap();

        // No sweep has run yet, but the expired record is already invisible.
        assert_eq!(relay.session_count(), 2);
        assert_eq!(relay.list_sessions().len(), 1);
        assert!(matches!(relay.drain_commands(&stale), Err(SpanError::UnknownSession(_))));
        assert!(matches!(
            relay.publish_frame(&stale, Frame::new(vec![1], 1, 1, 1)),
            Err(SpanError::UnknownSession(_))
        ));

        assert_eq!(relay.reap_expired(Instant::now()), vec![stale]);
        assert_eq!(relay.session_count(), 1);
    }

    #[test]
    fn zero_reap_interval_sweeps_every_call() {
        let relay = RelayService::new(RelayConfig {
            session_ttl: Duration::from_millis(50),
            reap_interval: Duration::ZERO,
            ..RelayConfig::default()
        });
        relay.register(agent()).unwrap();
        std::thread::sleep(Duration::from_millis(80));
        assert!(relay.list_sessions().is_empty());
        assert_eq!(relay.session_count(), 0);
    }

    // ── Concurrency ──────────────────────────────────────────────

    #[test]
    fn concurrent_enqueue_and_drain_keep_per_session_order() {
        const SESSIONS: usize = 4;
        const PER_SESSION: i32 = 200;

        let relay = RelayService::default();
        let ids: Vec<SessionId> = (0..SESSIONS).map(|_| relay.register(agent()).unwrap()).collect();
        let deadline = Instant::now() + Duration::from_secs(20);

        let received: Vec<Vec<i32>> = std::thread::scope(|scope| {
            for id in &ids {
                let relay = &relay;
                scope.spawn(move || {
                    for i in 0..PER_SESSION {
                        relay.enqueue_command(id, Command::scroll(i)).unwrap();
                    }
                });
            }
            let drainers: Vec<_> = ids
                .iter()
                .map(|id| {
                    let relay = &relay;
                    scope.spawn(move || {
                        let mut got = Vec::new();
                        while got.len() < PER_SESSION as usize {
                            assert!(Instant::now() < deadline, "drain stalled at {}", got.len());
                            got.extend(scroll_deltas(relay.drain_commands(id).unwrap()));
                            std::thread::yield_now();
                        }
                        got
                    })
                })
                .collect();
            drainers.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let expected: Vec<i32> = (0..PER_SESSION).collect();
        for got in received {
            assert_eq!(got, expected);
        }
        for id in &ids {
            assert!(relay.drain_commands(id).unwrap().is_empty());
        }
    }

    #[test]
    fn concurrent_publishers_leave_the_newest_frame() {
        use rand::seq::SliceRandom;

        const PUBLISHERS: u64 = 8;
        const FRAMES: u64 = 800;

        let relay = RelayService::default();
        let id = relay.register(agent()).unwrap();

        std::thread::scope(|scope| {
            for p in 0..PUBLISHERS {
                let (relay, id) = (&relay, &id);
                scope.spawn(move || {
                    let mut stamps: Vec<u64> = (p..FRAMES).step_by(PUBLISHERS as usize).collect();
                    stamps.shuffle(&mut rand::thread_rng());
                    for ts in stamps {
                        relay.publish_frame(id, Frame::new(vec![ts as u8], ts, 1, 1)).unwrap();
                    }
                });
            }
            let (relay, id) = (&relay, &id);
            scope.spawn(move || {
                let mut seen = 0;
                for _ in 0..2_000 {
                    if let Some(frame) = relay.fetch_frame(id).unwrap() {
                        assert!(frame.source_timestamp >= seen, "frame went backwards");
                        seen = frame.source_timestamp;
                    }
                }
            });
        });

        let last = relay.fetch_frame(&id).unwrap().unwrap();
        assert_eq!(last.source_timestamp, FRAMES - 1);
        assert_eq!(last.payload.as_ref(), &[(FRAMES - 1) as u8]);
    }

    #[test]
    fn concurrent_registrations_issue_distinct_ids() {
        let relay = RelayService::default();
        let ids: Vec<SessionId> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let relay = &relay;
                    scope.spawn(move || {
                        (0..50).map(|_| relay.register(agent()).unwrap()).collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 400);
        assert_eq!(relay.list_sessions().len(), 400);
    }
}
