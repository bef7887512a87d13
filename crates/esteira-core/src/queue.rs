use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::message::Message;

/// Upper bound on the number of entries a single `orphans` call returns.
pub const ORPHAN_SCAN_LIMIT: usize = 100;

/// The queue contract every adapter implements.
///
/// Semantics shared by all implementations:
///
/// - A message lives in *queue storage* from enqueue until `take`, which
///   moves its identity into *ephemeral storage* (when enabled) and hands
///   the payload to the consumer.
/// - `finalize` drops the ephemeral entry; `requeue`/`requeue_silent` move
///   the message back to the tail of queue storage and drop the ephemeral
///   entry in the same step.
/// - A taken id cannot be taken again until it is requeued or reclaimed
///   through the orphan scan: at-least-once delivery, no concurrent
///   duplicates while in flight.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Append a message to queue storage. `Ok(false)` means the commit did
    /// not reach queue storage; the caller may retry with the same message
    /// instance and no duplicate will materialize.
    async fn enqueue(&self, msg: &Message) -> Result<bool>;

    /// Move a taken message from ephemeral storage back to the tail of
    /// queue storage, stamping `timestamp` with the current instant and
    /// incrementing `num_requeues`.
    async fn requeue(&self, msg: &Message) -> Result<bool>;

    /// Same move as [`requeue`](Queue::requeue), with timestamp and requeue
    /// count left untouched.
    async fn requeue_silent(&self, msg: &Message) -> Result<bool>;

    /// Remove one message from queue storage and return it, recording it in
    /// ephemeral storage when enabled. Returns `None` when queue storage is
    /// empty or the ephemeral cap is reached.
    async fn take(&self) -> Result<Option<Message>>;

    /// Acknowledge a taken message: its ephemeral entry (and retained
    /// payload, where applicable) is discarded. Succeeds silently when the
    /// entry is already gone.
    async fn finalize(&self, msg: &Message) -> Result<()>;

    /// Every ephemeral entry taken before `now - threshold`, at most
    /// [`ORPHAN_SCAN_LIMIT`] per call. Empty when ephemeral storage is
    /// disabled or absent.
    async fn orphans(&self, threshold: Duration) -> Result<Vec<Message>>;

    /// Number of messages currently in queue storage. Approximate under
    /// concurrency.
    async fn queue_size(&self) -> Result<u64>;

    /// Number of messages currently in ephemeral storage. Zero when
    /// ephemeral storage is disabled or absent.
    async fn ephemeral_size(&self) -> Result<u64>;

    /// Drop every message from both storages.
    async fn purge(&self) -> Result<()>;
}
