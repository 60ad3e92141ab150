//! Per-session command mailboxes.
//!
//! Each queue is a bounded FIFO. When a queue is full, [`CommandQueues::enqueue`]
//! drops the **oldest** pending command to make room: a disconnected agent
//! must not grow relay memory without limit, and the newest input is the
//! one the controller still cares about.

use std::collections::VecDeque;

use dashmap::DashMap;
use tracing::warn;

use crate::error::SpanError;
use crate::protocol::{QueuedCommand, SessionId};

/// Result of an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOutcome {
    /// Queue depth after the append.
    pub depth: usize,
    /// Oldest commands discarded to respect the cap (0 or 1).
    pub dropped: usize,
}

pub struct CommandQueues {
    queues: DashMap<SessionId, VecDeque<QueuedCommand>>,
    capacity: usize,
}

impl CommandQueues {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Create an empty queue for a newly registered session.
    pub fn create(&self, id: &SessionId) {
        self.queues.insert(id.clone(), VecDeque::new());
    }

    /// Destroy `id`'s queue, discarding anything still pending, unless
    /// `is_live` says the id still names a session. The check runs under
    /// the entry's shard lock, so a queue recreated by a concurrent
    /// registration of the same id survives.
    pub fn discard_orphan(&self, id: &SessionId, is_live: impl Fn(&SessionId) -> bool) -> usize {
        self.queues
            .remove_if(id, |key, _| !is_live(key))
            .map(|(_, q)| q.len())
            .unwrap_or(0)
    }

    /// Append to the tail of `id`'s queue.
    pub fn enqueue(&self, id: &SessionId, command: QueuedCommand) -> Result<EnqueueOutcome, SpanError> {
        let mut queue = self
            .queues
            .get_mut(id)
            .ok_or_else(|| SpanError::UnknownSession(id.to_string()))?;

        let mut dropped = 0;
        while queue.len() >= self.capacity {
            queue.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            warn!(session = %id, capacity = self.capacity, "command queue full; dropped oldest");
        }

        queue.push_back(command);
        Ok(EnqueueOutcome {
            depth: queue.len(),
            dropped,
        })
    }

    /// Remove and return everything pending, in arrival order.
    ///
    /// An empty vector means "nothing yet", not an error.
    pub fn drain_all(&self, id: &SessionId) -> Result<Vec<QueuedCommand>, SpanError> {
        let mut queue = self
            .queues
            .get_mut(id)
            .ok_or_else(|| SpanError::UnknownSession(id.to_string()))?;
        Ok(queue.drain(..).collect())
    }

    /// Number of pending commands, or `None` for an unknown session.
    pub fn pending(&self, id: &SessionId) -> Option<usize> {
        self.queues.get(id).map(|q| q.len())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
