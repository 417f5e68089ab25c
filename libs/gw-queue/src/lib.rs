//! The bounded queue (component D): a capacity-limited, non-blocking
//! handoff from the ingestion producer path (and the replay loop) to the
//! worker pool's batchers.
//!
//! Built on `tokio::sync::mpsc`'s bounded channel, whose `try_send`/`close`
//! semantics already match the contract: closing the receiver stops further
//! enqueues immediately while letting consumers drain whatever is still
//! buffered before they see end-of-stream.

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("queue is at capacity")]
    Full,
    #[error("queue is closed")]
    Closed,
}

/// Multi-producer, multi-consumer bounded FIFO. Clone to share a producer
/// handle; consumers call [`BoundedQueue::dequeue`] concurrently and share
/// whatever arrives, first-come-first-served.
pub struct BoundedQueue<T> {
    sender: mpsc::Sender<T>,
    receiver: Mutex<mpsc::Receiver<T>>,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Non-blocking enqueue. Returns [`EnqueueError::Full`] if the queue is
    /// at capacity, [`EnqueueError::Closed`] after [`close`](Self::close).
    pub fn try_enqueue(&self, item: T) -> Result<(), EnqueueError> {
        self.sender.try_send(item).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Suspends until an item is available, the queue is closed and
    /// drained, or another caller is already awaiting the same item, in
    /// which case this one keeps waiting for the next.
    pub async fn dequeue(&self) -> Option<T> {
        self.receiver.lock().await.recv().await
    }

    /// Stops further `try_enqueue` calls from succeeding. Items already
    /// buffered remain available to `dequeue` until the queue is drained,
    /// after which `dequeue` returns `None` forever.
    pub async fn close(&self) {
        self.receiver.lock().await.close();
    }

    /// Approximate number of items currently buffered. Used for metrics and
    /// readiness checks; may be stale by the time the caller observes it.
    pub fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn enqueue_then_dequeue_preserves_order() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(4);
        queue.try_enqueue(1).unwrap();
        queue.try_enqueue(2).unwrap();
        queue.try_enqueue(3).unwrap();

        assert_eq!(queue.dequeue().await, Some(1));
        assert_eq!(queue.dequeue().await, Some(2));
        assert_eq!(queue.dequeue().await, Some(3));
    }

    #[tokio::test]
    async fn try_enqueue_rejects_when_full() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(2);
        queue.try_enqueue(1).unwrap();
        queue.try_enqueue(2).unwrap();
        assert_eq!(queue.try_enqueue(3), Err(EnqueueError::Full));

        queue.dequeue().await;
        queue.try_enqueue(3).unwrap();
    }

    #[tokio::test]
    async fn depth_and_capacity_reflect_buffered_items() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(5);
        assert_eq!(queue.capacity(), 5);
        assert_eq!(queue.depth(), 0);
        queue.try_enqueue(1).unwrap();
        queue.try_enqueue(2).unwrap();
        assert_eq!(queue.depth(), 2);
    }

    #[tokio::test]
    async fn close_drains_buffered_items_then_ends_stream() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(4);
        queue.try_enqueue(1).unwrap();
        queue.try_enqueue(2).unwrap();
        queue.close().await;

        assert_eq!(queue.try_enqueue(3), Err(EnqueueError::Closed));
        assert_eq!(queue.dequeue().await, Some(1));
        assert_eq!(queue.dequeue().await, Some(2));
        assert_eq!(queue.dequeue().await, None);
    }

    #[tokio::test]
    async fn multiple_consumers_share_the_stream_without_duplication() {
        let queue = Arc::new(BoundedQueue::<u32>::new(16));
        for i in 0..10 {
            queue.try_enqueue(i).unwrap();
        }
        queue.close().await;

        let mut handles = Vec::new();
        for _ in 0..3 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(item) = queue.dequeue().await {
                    seen.push(item);
                }
                seen
            }));
        }

        let mut total = Vec::new();
        for handle in handles {
            total.extend(tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap());
        }
        total.sort_unstable();
        assert_eq!(total, (0..10).collect::<Vec<_>>());
    }
}
