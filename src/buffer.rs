//! Prefetch Buffer
//!
//! Bounded FIFO of batches shared between a background pipeline thread and
//! the table's caller thread.
//!
//! ## Concurrency
//! - One coarse `Mutex` guards the queue
//! - `not_empty` / `not_full` condition variables wake waiting threads
//! - Every wait is bounded by a caller-supplied timeout, so loops around
//!   these calls can re-check their own stop flags

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::record::Batch;

/// Bounded single-owner handoff queue of batches
pub struct PrefetchBuffer {
    queue: Mutex<VecDeque<Batch>>,
    capacity: usize,
    not_empty: Condvar,
    not_full: Condvar,
}

impl PrefetchBuffer {
    /// Create a buffer holding at most `capacity` batches (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Enqueue a copy of `batch` if there is room
    ///
    /// Returns false (and stores nothing) when the buffer is full.
    pub fn try_enqueue(&self, batch: &Batch) -> bool {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            return false;
        }
        queue.push_back(batch.clone());
        drop(queue);
        self.not_empty.notify_one();
        true
    }

    /// Enqueue a copy of `batch`, waiting up to `timeout` for room
    pub fn enqueue_timeout(&self, batch: &Batch, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock();
        while queue.len() >= self.capacity {
            if self.not_full.wait_until(&mut queue, deadline).timed_out() {
                if queue.len() >= self.capacity {
                    return false;
                }
                break;
            }
        }
        queue.push_back(batch.clone());
        drop(queue);
        self.not_empty.notify_one();
        true
    }

    /// Remove the oldest batch, if any
    pub fn try_dequeue(&self) -> Option<Batch> {
        let batch = self.queue.lock().pop_front();
        if batch.is_some() {
            self.not_full.notify_one();
        }
        batch
    }

    /// Remove the oldest batch, waiting up to `timeout` for one to arrive
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<Batch> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock();
        while queue.is_empty() {
            if self.not_empty.wait_until(&mut queue, deadline).timed_out() {
                break;
            }
        }
        let batch = queue.pop_front();
        drop(queue);
        if batch.is_some() {
            self.not_full.notify_one();
        }
        batch
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Number of queued batches
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for PrefetchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
