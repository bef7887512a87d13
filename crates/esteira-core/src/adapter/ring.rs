use std::time::Duration;

use async_trait::async_trait;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

use crate::error::{QueueError, Result};
use crate::message::{now_ms, Message};
use crate::queue::Queue;

/// Bounded in-process ring for latency-sensitive pipelines.
///
/// Publication runs through a fixed-capacity MPMC channel: producers and
/// consumers never contend on a shared lock held across the payload copy.
/// There is no ephemeral storage and no crash durability - `finalize` is a
/// formality, `ephemeral_size` is zero and `orphans` is empty. A full ring
/// reports the enqueue as uncommitted rather than blocking.
pub struct RingQueue {
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

impl RingQueue {
    /// Create a ring holding at most `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    fn push(&self, msg: Message) -> Result<bool> {
        match self.tx.try_send(msg) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => {
                Err(QueueError::Backend("ring disconnected".to_string()))
            }
        }
    }
}

#[async_trait]
impl Queue for RingQueue {
    async fn enqueue(&self, msg: &Message) -> Result<bool> {
        self.push(msg.clone())
    }

    async fn requeue(&self, msg: &Message) -> Result<bool> {
        self.push(msg.requeued(now_ms()))
    }

    async fn requeue_silent(&self, msg: &Message) -> Result<bool> {
        self.push(msg.clone())
    }

    async fn take(&self) -> Result<Option<Message>> {
        match self.rx.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(QueueError::Backend("ring disconnected".to_string()))
            }
        }
    }

    async fn finalize(&self, _msg: &Message) -> Result<()> {
        Ok(())
    }

    async fn orphans(&self, _threshold: Duration) -> Result<Vec<Message>> {
        Ok(Vec::new())
    }

    async fn queue_size(&self) -> Result<u64> {
        Ok(self.rx.len() as u64)
    }

    async fn ephemeral_size(&self) -> Result<u64> {
        Ok(0)
    }

    async fn purge(&self) -> Result<()> {
        while self.rx.try_recv().is_ok() {}
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_round_trip() {
        let queue = RingQueue::with_capacity(8);
        for content in [b"a", b"b", b"c"] {
            assert!(queue.enqueue(&Message::new(content.to_vec())).await.unwrap());
        }
        assert_eq!(queue.queue_size().await.unwrap(), 3);
        for expected in [b"a", b"b", b"c"] {
            let taken = queue.take().await.unwrap().unwrap();
            assert_eq!(taken.content, expected);
            queue.finalize(&taken).await.unwrap();
        }
        assert!(queue.take().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn full_ring_reports_uncommitted_enqueue() {
        let queue = RingQueue::with_capacity(2);
        assert!(queue.enqueue(&Message::new(vec![1])).await.unwrap());
        assert!(queue.enqueue(&Message::new(vec![2])).await.unwrap());
        assert!(!queue.enqueue(&Message::new(vec![3])).await.unwrap());

        let taken = queue.take().await.unwrap().unwrap();
        queue.finalize(&taken).await.unwrap();
        assert!(queue.enqueue(&Message::new(vec![3])).await.unwrap());
    }

    #[tokio::test]
    async fn requeue_applies_bookkeeping() {
        let queue = RingQueue::with_capacity(4);
        let msg = Message::new(b"r".to_vec());
        queue.enqueue(&msg).await.unwrap();

        let taken = queue.take().await.unwrap().unwrap();
        queue.requeue(&taken).await.unwrap();
        let again = queue.take().await.unwrap().unwrap();
        assert_eq!(again.num_requeues, 1);
        assert_eq!(again.origin_timestamp, msg.origin_timestamp);

        queue.requeue_silent(&again).await.unwrap();
        let silent = queue.take().await.unwrap().unwrap();
        assert_eq!(silent.num_requeues, 1);
    }

    #[tokio::test]
    async fn contract_degenerates_without_ephemeral_storage() {
        let queue = RingQueue::with_capacity(2);
        queue.enqueue(&Message::new(vec![7])).await.unwrap();
        let _taken = queue.take().await.unwrap().unwrap();
        assert_eq!(queue.ephemeral_size().await.unwrap(), 0);
        assert!(queue
            .orphans(Duration::from_millis(0))
            .await
            .unwrap()
            .is_empty());
    }
}
