//! Bounded FIFO of inbound put requests
//!
//! The receiver pushes without blocking; workers drain at their own pace.

use crate::error::{DhtError, Result};
use hashmesh_protocol::Message;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;

/// Inbound request with queueing metadata
#[derive(Debug, Clone)]
pub struct QueuedRequest {
    /// The announcing message
    pub message: Message,

    /// When the request was queued (Unix timestamp)
    pub received_at: u64,
}

impl QueuedRequest {
    pub fn new(message: Message) -> Self {
        let received_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        QueuedRequest {
            message,
            received_at,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<QueuedRequest>,
    closed: bool,
}

/// Bounded, concurrency-safe request queue
#[derive(Debug)]
pub struct RequestQueue {
    state: Mutex<QueueState>,

    /// Wakes waiting consumers
    notify: Notify,

    capacity: usize,
}

impl RequestQueue {
    /// Create a new queue holding at most `capacity` requests
    pub fn new(capacity: usize) -> Self {
        RequestQueue {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Every critical section is a single VecDeque operation, so a
        // poisoned lock still holds a consistent queue
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a request without blocking
    pub fn put(&self, message: Message) -> Result<()> {
        {
            let mut state = self.lock();

            if state.closed {
                return Err(DhtError::QueueUnavailable("queue closed".into()));
            }
            if state.items.len() >= self.capacity {
                return Err(DhtError::QueueUnavailable(format!(
                    "queue full ({} pending)",
                    self.capacity
                )));
            }

            state.items.push_back(QueuedRequest::new(message));
        }

        self.notify.notify_one();
        Ok(())
    }

    /// Dequeue the oldest request if one is waiting
    pub fn try_take(&self) -> Option<QueuedRequest> {
        self.lock().items.pop_front()
    }

    /// Wait for the next request
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn take(&self) -> Option<QueuedRequest> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Stop accepting requests and wake all consumers
    ///
    /// Requests already queued can still be taken.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of pending requests
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashmesh_protocol::{Hash, MessageBody, MessageType, NodeId};
    use std::sync::Arc;
    use std::time::Duration;

    fn put_request(n: u8) -> Message {
        Message::new(
            NodeId::from_bytes([1; 32]),
            MessageType::PutRequest,
            MessageBody::Hash(Hash::from_bytes([n; 32])),
        )
    }

    #[test]
    fn test_empty_queue() {
        let queue = RequestQueue::new(4);
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 4);
        assert!(queue.try_take().is_none());
    }

    #[test]
    fn test_fifo_order() {
        let queue = RequestQueue::new(10);
        for i in 0..5 {
            queue.put(put_request(i)).unwrap();
        }
        assert_eq!(queue.len(), 5);

        for i in 0..5 {
            let item = queue.try_take().unwrap();
            assert_eq!(item.message.hash(), Some(&Hash::from_bytes([i; 32])));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_rejects() {
        let queue = RequestQueue::new(2);
        queue.put(put_request(1)).unwrap();
        queue.put(put_request(2)).unwrap();

        let result = queue.put(put_request(3));
        assert!(matches!(result, Err(DhtError::QueueUnavailable(_))));
        assert_eq!(queue.len(), 2);

        // Space frees up after a take
        queue.try_take().unwrap();
        assert!(queue.put(put_request(3)).is_ok());
    }

    #[test]
    fn test_closed_queue_rejects_but_drains() {
        let queue = RequestQueue::new(4);
        queue.put(put_request(1)).unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert!(matches!(
            queue.put(put_request(2)),
            Err(DhtError::QueueUnavailable(_))
        ));
        assert!(queue.try_take().is_some());
    }

    #[tokio::test]
    async fn test_take_waits_for_put() {
        let queue = Arc::new(RequestQueue::new(4));

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.take().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.put(put_request(7)).unwrap();

        let item = consumer.await.unwrap().unwrap();
        assert_eq!(item.message.hash(), Some(&Hash::from_bytes([7; 32])));
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let queue = Arc::new(RequestQueue::new(4));

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.take().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();

        for consumer in consumers {
            assert!(consumer.await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_concurrent_producers() {
        let queue = Arc::new(RequestQueue::new(1000));

        let producers: Vec<_> = (0..10u8)
            .map(|p| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        queue.put(put_request(p)).unwrap();
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.await.unwrap();
        }

        assert_eq!(queue.len(), 500);
    }
}
