#![allow(dead_code)]

//! The shared functional suite every reliability-offering adapter must pass.
//!
//! The in-memory adapter is the behavioral reference; the Redis and
//! PostgreSQL test files run these same scenarios against live backends.
//! All helpers assume ephemeral storage is enabled unless stated otherwise.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use esteira_core::{Message, Queue};

/// Install the logging subscriber once per test binary; later calls no-op.
pub fn init_logging() {
    esteira_core::telemetry::init_tracing();
}

/// Enqueue one payload, take it, finalize it, and watch both sizes go back
/// to zero.
pub async fn round_trip(queue: &dyn Queue) {
    let msg = Message::new(b"hello".to_vec());
    assert!(queue.enqueue(&msg).await.unwrap());
    assert_eq!(queue.queue_size().await.unwrap(), 1);
    assert_eq!(queue.ephemeral_size().await.unwrap(), 0);

    let taken = queue.take().await.unwrap().expect("one message pending");
    assert_eq!(taken.id, msg.id);
    assert_eq!(taken.content, b"hello");
    assert_eq!(taken.num_requeues, 0);
    assert_eq!(taken.origin_timestamp, taken.timestamp);
    assert_eq!(queue.queue_size().await.unwrap(), 0);
    assert_eq!(queue.ephemeral_size().await.unwrap(), 1);

    queue.finalize(&taken).await.unwrap();
    assert_eq!(queue.queue_size().await.unwrap(), 0);
    assert_eq!(queue.ephemeral_size().await.unwrap(), 0);
    assert!(queue.take().await.unwrap().is_none());
}

/// A requeue stamps a fresh timestamp and bumps the requeue count; the
/// origin timestamp survives.
pub async fn requeue_updates_bookkeeping(queue: &dyn Queue) {
    let msg = Message::new(b"x".to_vec());
    let t0 = msg.timestamp;
    queue.enqueue(&msg).await.unwrap();

    let taken = queue.take().await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(15)).await;
    assert!(queue.requeue(&taken).await.unwrap());
    assert_eq!(queue.ephemeral_size().await.unwrap(), 0);

    let again = queue.take().await.unwrap().unwrap();
    assert_eq!(again.id, msg.id);
    assert_eq!(again.num_requeues, 1);
    assert_eq!(again.origin_timestamp, t0);
    assert!(again.timestamp > t0, "timestamp must move to the requeue instant");
    queue.finalize(&again).await.unwrap();
}

/// A silent requeue leaves both the timestamp and the count untouched.
pub async fn silent_requeue_preserves_bookkeeping(queue: &dyn Queue) {
    let msg = Message::new(b"y".to_vec());
    queue.enqueue(&msg).await.unwrap();

    let taken = queue.take().await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(15)).await;
    assert!(queue.requeue_silent(&taken).await.unwrap());

    let again = queue.take().await.unwrap().unwrap();
    assert_eq!(again.num_requeues, 0);
    assert_eq!(again.timestamp, msg.timestamp);
    queue.finalize(&again).await.unwrap();
}

/// A taken-but-never-finalized message shows up in the orphan scan once the
/// threshold has passed, and a requeue makes it deliverable again.
pub async fn orphan_reclaim(queue: &dyn Queue) {
    let msg = Message::new(b"orph".to_vec());
    queue.enqueue(&msg).await.unwrap();
    let taken = queue.take().await.unwrap().unwrap();

    // Not yet an orphan under a generous threshold.
    let early = queue.orphans(Duration::from_secs(3600)).await.unwrap();
    assert!(early.is_empty());

    tokio::time::sleep(Duration::from_millis(120)).await;
    let orphans = queue.orphans(Duration::from_millis(50)).await.unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].id, taken.id);
    assert_eq!(orphans[0].content, b"orph");

    queue.requeue(&orphans[0]).await.unwrap();
    let reclaimed = queue.take().await.unwrap().expect("reclaimed message");
    assert_eq!(reclaimed.content, b"orph");
    queue.finalize(&reclaimed).await.unwrap();
}

/// Sequential enqueues come back in enqueue order through a single consumer.
pub async fn fifo_order(queue: &dyn Queue) {
    for content in [b"a", b"b", b"c"] {
        assert!(queue.enqueue(&Message::new(content.to_vec())).await.unwrap());
        // Keep enqueue timestamps distinct at millisecond resolution.
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for expected in [b"a", b"b", b"c"] {
        let taken = queue.take().await.unwrap().expect("pending message");
        assert_eq!(taken.content, expected);
        queue.finalize(&taken).await.unwrap();
    }
}

/// With an ephemeral cap of two, the third take reports an empty queue
/// until one in-flight message is finalized.
pub async fn cap_pushback(queue: &dyn Queue) {
    for i in 0..4u8 {
        queue.enqueue(&Message::new(vec![i])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let first = queue.take().await.unwrap().unwrap();
    let second = queue.take().await.unwrap().unwrap();
    assert!(queue.take().await.unwrap().is_none(), "cap of 2 reached");

    queue.finalize(&first).await.unwrap();
    let third = queue.take().await.unwrap().expect("slot freed");
    assert_eq!(third.content, vec![2]);

    queue.finalize(&second).await.unwrap();
    queue.finalize(&third).await.unwrap();
}

/// `queue_size` moves by one per enqueue and per take; `ephemeral_size`
/// mirrors the in-flight set.
pub async fn size_tracking(queue: &dyn Queue) {
    for i in 1..=3u64 {
        queue.enqueue(&Message::new(vec![i as u8])).await.unwrap();
        assert_eq!(queue.queue_size().await.unwrap(), i);
    }

    let a = queue.take().await.unwrap().unwrap();
    let b = queue.take().await.unwrap().unwrap();
    assert_eq!(queue.queue_size().await.unwrap(), 1);
    assert_eq!(queue.ephemeral_size().await.unwrap(), 2);

    queue.finalize(&a).await.unwrap();
    assert_eq!(queue.ephemeral_size().await.unwrap(), 1);
    queue.finalize(&b).await.unwrap();

    let c = queue.take().await.unwrap().unwrap();
    queue.finalize(&c).await.unwrap();
    assert_eq!(queue.queue_size().await.unwrap(), 0);
    assert_eq!(queue.ephemeral_size().await.unwrap(), 0);
}

/// Concurrent producers and consumers: every enqueued id is delivered to
/// exactly one consumer, none are lost, none are duplicated.
pub async fn no_loss_no_duplication(
    queue: Arc<dyn Queue>,
    producers: usize,
    consumers: usize,
    per_producer: usize,
) {
    let total = producers * per_producer;
    let enqueued_ids = Arc::new(Mutex::new(HashSet::new()));
    let taken_ids = Arc::new(Mutex::new(HashSet::new()));
    let taken_count = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for p in 0..producers {
        let queue = Arc::clone(&queue);
        let enqueued_ids = Arc::clone(&enqueued_ids);
        tasks.push(tokio::spawn(async move {
            for i in 0..per_producer {
                let msg = Message::new(format!("{p}:{i}").into_bytes());
                // Retry the rare uncommitted enqueue.
                while !queue.enqueue(&msg).await.unwrap() {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                enqueued_ids.lock().unwrap().insert(msg.id);
            }
        }));
    }

    for _ in 0..consumers {
        let queue = Arc::clone(&queue);
        let taken_ids = Arc::clone(&taken_ids);
        let taken_count = Arc::clone(&taken_count);
        tasks.push(tokio::spawn(async move {
            let deadline = Instant::now() + Duration::from_secs(30);
            while taken_count.load(Ordering::SeqCst) < total {
                assert!(Instant::now() < deadline, "consumers timed out");
                match queue.take().await.unwrap() {
                    Some(msg) => {
                        let fresh = taken_ids.lock().unwrap().insert(msg.id);
                        assert!(fresh, "message {} delivered twice", msg.id);
                        queue.finalize(&msg).await.unwrap();
                        taken_count.fetch_add(1, Ordering::SeqCst);
                    }
                    None => tokio::time::sleep(Duration::from_millis(2)).await,
                }
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    let enqueued_ids = enqueued_ids.lock().unwrap();
    let taken_ids = taken_ids.lock().unwrap();
    assert_eq!(taken_ids.len(), total);
    assert_eq!(*taken_ids, *enqueued_ids);
    assert_eq!(queue.queue_size().await.unwrap(), 0);
    assert_eq!(queue.ephemeral_size().await.unwrap(), 0);
}
