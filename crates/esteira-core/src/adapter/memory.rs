use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::config::QueueOptions;
use crate::ephemeral::{EphemeralPolicy, StoreCase};
use crate::error::Result;
use crate::message::{now_ms, Message};
use crate::queue::{Queue, ORPHAN_SCAN_LIMIT};

/// In-process adapter and behavioral reference for the contract.
///
/// Queue storage is an ordered sequence of ids, ephemeral storage a mapping
/// from id to take instant; payloads live in a third mapping until finalize.
/// Every operation holds one short-lived exclusive lock.
pub struct MemoryQueue {
    policy: EphemeralPolicy,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    pending: VecDeque<Uuid>,
    messages: HashMap<Uuid, Message>,
    /// id -> take instant (epoch millis) for messages in ephemeral storage.
    taken_at: HashMap<Uuid, u64>,
}

impl MemoryQueue {
    pub fn new(options: &QueueOptions) -> Self {
        Self {
            policy: EphemeralPolicy::new(options),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn store(&self, msg: &Message, case: StoreCase) -> bool {
        let stored = self.policy.bookkeep(msg, case, now_ms());
        let mut inner = self.inner.lock();
        // A requeue clears the ephemeral entry in the same step.
        if self.policy.resolve(case) != StoreCase::New {
            inner.taken_at.remove(&stored.id);
        }
        if !inner.pending.contains(&stored.id) {
            inner.pending.push_back(stored.id);
        }
        inner.messages.insert(stored.id, stored);
        true
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(&QueueOptions::default())
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn enqueue(&self, msg: &Message) -> Result<bool> {
        Ok(self.store(msg, StoreCase::New))
    }

    async fn requeue(&self, msg: &Message) -> Result<bool> {
        Ok(self.store(msg, StoreCase::Requeue))
    }

    async fn requeue_silent(&self, msg: &Message) -> Result<bool> {
        Ok(self.store(msg, StoreCase::RequeueSilent))
    }

    async fn take(&self) -> Result<Option<Message>> {
        let now = now_ms();
        let mut inner = self.inner.lock();
        if self.policy.cap_reached(inner.taken_at.len() as u64) {
            return Ok(None);
        }
        let Some(id) = inner.pending.pop_front() else {
            return Ok(None);
        };
        if self.policy.enabled() {
            let Some(msg) = inner.messages.get(&id).cloned() else {
                warn!(%id, "pending id without a payload, dropping");
                return Ok(None);
            };
            inner.taken_at.insert(id, now);
            Ok(Some(msg))
        } else {
            Ok(inner.messages.remove(&id))
        }
    }

    async fn finalize(&self, msg: &Message) -> Result<()> {
        let mut inner = self.inner.lock();
        // Only drop the payload when the id was actually in ephemeral
        // storage; a message requeued in the meantime keeps its payload.
        if inner.taken_at.remove(&msg.id).is_some() {
            inner.messages.remove(&msg.id);
        }
        Ok(())
    }

    async fn orphans(&self, threshold: Duration) -> Result<Vec<Message>> {
        let cutoff = now_ms().saturating_sub(threshold.as_millis() as u64);
        let inner = self.inner.lock();
        let mut aged: Vec<(u64, Uuid)> = inner
            .taken_at
            .iter()
            .filter(|(_, taken)| **taken <= cutoff)
            .map(|(id, taken)| (*taken, *id))
            .collect();
        aged.sort_unstable();
        Ok(aged
            .into_iter()
            .take(ORPHAN_SCAN_LIMIT)
            .filter_map(|(_, id)| inner.messages.get(&id).cloned())
            .collect())
    }

    async fn queue_size(&self) -> Result<u64> {
        Ok(self.inner.lock().pending.len() as u64)
    }

    async fn ephemeral_size(&self) -> Result<u64> {
        Ok(self.inner.lock().taken_at.len() as u64)
    }

    async fn purge(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.pending.clear();
        inner.messages.clear();
        inner.taken_at.clear();
        Ok(())
    }
}
