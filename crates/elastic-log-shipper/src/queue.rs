// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded, closable FIFO shared by `submit` and the workers.
//!
//! ```text
//!   producers ── try_enqueue ──> [ e1 e2 e3 ... ] ── dequeue ──> workers
//!                                      │
//!                               close(): no more enqueues,
//!                               dequeuers drain then get None
//! ```
//!
//! Enqueueing never waits: a full or closed queue rejects the entry and the
//! caller's [`crate::LoggingGuarantee`] decides what happens next. Dequeueing
//! waits for an entry, and only returns `None` once the queue is closed and
//! empty.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::Notify;
use tracing::debug;

/// An encoded document and the index it is routed to.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub index: String,
    pub payload: Value,
}

impl QueueEntry {
    #[must_use]
    pub fn new(index: String, payload: Value) -> Self {
        Self { index, payload }
    }
}

#[derive(Debug, Default)]
struct State {
    entries: VecDeque<QueueEntry>,
    closed: bool,
}

#[derive(Debug)]
pub struct DeliveryQueue {
    state: Mutex<State>,
    /// Mirror of `entries.len()` readable without the lock.
    len: AtomicUsize,
    capacity: usize,
    notify: Notify,
}

impl DeliveryQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                entries: VecDeque::with_capacity(capacity.min(4_096)),
                closed: false,
            }),
            len: AtomicUsize::new(0),
            capacity,
            notify: Notify::new(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `entry` unless the queue is full or closed.
    ///
    /// On rejection the entry is handed back so the caller can retry it.
    pub fn try_enqueue(&self, entry: QueueEntry) -> Result<(), QueueEntry> {
        {
            let Ok(mut state) = self.state.lock() else {
                return Err(entry);
            };
            if state.closed || state.entries.len() >= self.capacity {
                return Err(entry);
            }
            state.entries.push_back(entry);
            self.len.store(state.entries.len(), Ordering::Release);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Next entry in FIFO order, waiting for one if the queue is empty.
    ///
    /// Returns `None` only once the queue is closed and fully drained.
    pub async fn dequeue(&self) -> Option<QueueEntry> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before looking at the state so a wakeup between the
            // check and the await is not lost.
            notified.as_mut().enable();

            {
                let Ok(mut state) = self.state.lock() else {
                    return None;
                };
                if let Some(entry) = state.entries.pop_front() {
                    self.len.store(state.entries.len(), Ordering::Release);
                    return Some(entry);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Rejects further enqueues and wakes every waiting dequeuer.
    ///
    /// Entries already queued stay available until drained. Idempotent.
    pub fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            if !state.closed {
                debug!("SHIPPER | Closing delivery queue with {} pending entries", state.entries.len());
            }
            state.closed = true;
        }
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|state| state.closed).unwrap_or(true)
    }

    /// Lock-free occupancy; may lag behind concurrent operations.
    #[must_use]
    pub fn approximate_len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Occupancy read under the queue lock.
    #[must_use]
    pub fn exact_len(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.entries.len())
            .unwrap_or_else(|_| self.approximate_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn entry(n: u64) -> QueueEntry {
        QueueEntry::new("logs".to_string(), json!({ "n": n }))
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = DeliveryQueue::new(10);
        for n in 0..5 {
            queue.try_enqueue(entry(n)).unwrap();
        }
        for n in 0..5 {
            assert_eq!(queue.dequeue().await, Some(entry(n)));
        }
    }

    #[test]
    fn test_rejects_when_full() {
        let queue = DeliveryQueue::new(2);
        assert!(queue.try_enqueue(entry(1)).is_ok());
        assert!(queue.try_enqueue(entry(2)).is_ok());
        assert_eq!(queue.try_enqueue(entry(3)), Err(entry(3)));
        assert_eq!(queue.exact_len(), 2);
        assert_eq!(queue.approximate_len(), 2);
    }

    #[test]
    fn test_rejects_after_close() {
        let queue = DeliveryQueue::new(2);
        queue.close();
        queue.close();
        assert!(queue.is_closed());
        assert!(queue.try_enqueue(entry(1)).is_err());
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = DeliveryQueue::new(10);
        queue.try_enqueue(entry(1)).unwrap();
        queue.try_enqueue(entry(2)).unwrap();
        queue.close();

        assert_eq!(queue.dequeue().await, Some(entry(1)));
        assert_eq!(queue.dequeue().await, Some(entry(2)));
        assert_eq!(queue.dequeue().await, None);
        assert_eq!(queue.dequeue().await, None);
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_entry() {
        let queue = Arc::new(DeliveryQueue::new(10));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        queue.try_enqueue(entry(7)).unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Some(entry(7)));
    }

    #[tokio::test]
    async fn test_close_wakes_every_waiter() {
        let queue = Arc::new(DeliveryQueue::new(10));
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.dequeue().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        for consumer in consumers {
            let got = tokio::time::timeout(Duration::from_secs(1), consumer)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(got, None);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_entry_lost_or_duplicated_across_consumers() {
        let queue = Arc::new(DeliveryQueue::new(1_000));
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    let mut seen = Vec::new();
                    while let Some(entry) = queue.dequeue().await {
                        seen.push(entry.payload["n"].as_u64().unwrap());
                    }
                    seen
                })
            })
            .collect();

        for n in 0..500 {
            queue.try_enqueue(entry(n)).unwrap();
            if n % 50 == 0 {
                tokio::task::yield_now().await;
            }
        }
        queue.close();

        let mut all = Vec::new();
        for consumer in consumers {
            let seen = consumer.await.unwrap();
            // each consumer sees its share in FIFO order
            assert!(seen.windows(2).all(|w| w[0] < w[1]));
            all.extend(seen);
        }
        all.sort_unstable();
        assert_eq!(all, (0..500).collect::<Vec<_>>());
    }
}
