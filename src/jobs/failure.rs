//! # Bounded failure queue.
//!
//! Every job failure (a failed one-shot, a failed periodic iteration, a failed
//! initializer) is pushed as a [`JobFailure`] record. The queue holds at most
//! `capacity` records; pushing into a full queue drops the **oldest** record and
//! increments [`dropped`](FailureQueue::dropped). Pushing never blocks.
//!
//! ```text
//! push(f5) on [f1 f2 f3 f4] (capacity 4)  ──►  [f2 f3 f4 f5], dropped += 1
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::spec::{JobId, JobKind};
use crate::error::JobError;

/// Record of one job failure.
#[derive(Clone, Debug)]
pub struct JobFailure {
    /// Failed job.
    pub job: JobId,
    /// Its name.
    pub name: String,
    /// How it was scheduled.
    pub kind: JobKind,
    /// Which execution failed (1-based).
    pub iteration: u64,
    /// The error.
    pub error: JobError,
    /// When the failure was recorded.
    pub at: SystemTime,
}

struct Inner {
    capacity: usize,
    items: Mutex<VecDeque<JobFailure>>,
    dropped: AtomicU64,
    notify: Notify,
}

/// Shared bounded queue of job failures. Cheap to clone.
#[derive(Clone)]
pub struct FailureQueue {
    inner: Arc<Inner>,
}

impl FailureQueue {
    /// Creates a queue holding at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                capacity,
                items: Mutex::new(VecDeque::with_capacity(capacity)),
                dropped: AtomicU64::new(0),
                notify: Notify::new(),
            }),
        }
    }

    /// Appends a record, evicting the oldest one if the queue is full.
    pub fn push(&self, failure: JobFailure) {
        {
            let mut items = self.inner.items.lock();
            if items.len() >= self.inner.capacity {
                items.pop_front();
                self.inner.dropped.fetch_add(1, AtomicOrdering::Relaxed);
            }
            items.push_back(failure);
        }
        self.inner.notify.notify_one();
    }

    /// Removes and returns the oldest record, if any.
    pub fn try_pop(&self) -> Option<JobFailure> {
        self.inner.items.lock().pop_front()
    }

    /// Removes and returns all records, oldest first.
    pub fn drain(&self) -> Vec<JobFailure> {
        self.inner.items.lock().drain(..).collect()
    }

    /// Waits for the next record.
    pub async fn recv(&self) -> JobFailure {
        loop {
            if let Some(f) = self.try_pop() {
                return f;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Number of queued records.
    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued records.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of records evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(AtomicOrdering::Relaxed)
    }
}
