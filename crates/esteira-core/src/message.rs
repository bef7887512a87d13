use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current wall-clock time as epoch milliseconds.
///
/// All queue bookkeeping (enqueue/requeue stamps, ephemeral take stamps,
/// orphan thresholds) uses this clock.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Core message domain type flowing through every adapter.
///
/// `origin_timestamp` is set once at first enqueue and never mutated;
/// `timestamp` moves forward on every enqueue or requeue. Both are epoch
/// milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub content: Vec<u8>,
    pub origin_timestamp: u64,
    pub timestamp: u64,
    pub num_requeues: u32,
}

impl Message {
    /// Create a fresh message with a new UUIDv7 id and both timestamps set
    /// to the current instant.
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::now_v7(),
            content: content.into(),
            origin_timestamp: now,
            timestamp: now,
            num_requeues: 0,
        }
    }

    /// Copy of this message stamped for a requeue: `timestamp` moves to
    /// `now`, the requeue count goes up by one. `origin_timestamp` is
    /// untouched.
    pub(crate) fn requeued(&self, now: u64) -> Self {
        Self {
            timestamp: now,
            num_requeues: self.num_requeues + 1,
            ..self.clone()
        }
    }
}
