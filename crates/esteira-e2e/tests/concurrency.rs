//! Concurrent producer/consumer behavior: no loss, no duplicate delivery.

mod helpers;

use std::sync::Arc;

use esteira_core::{MemoryQueue, Queue, RingQueue};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_no_loss_no_duplication() {
    let queue: Arc<dyn Queue> = Arc::new(MemoryQueue::default());
    helpers::no_loss_no_duplication(queue, 3, 4, 50).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ring_no_loss_no_duplication() {
    let queue: Arc<dyn Queue> = Arc::new(RingQueue::with_capacity(1024));
    helpers::no_loss_no_duplication(queue, 3, 4, 50).await;
}
