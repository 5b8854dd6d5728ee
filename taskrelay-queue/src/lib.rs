//! A bounded, optionally-prioritized job queue.
//!
//! Two operating modes selected at construction: strict FIFO, or priority
//! (max-priority-first, ties broken by enqueue order). Internally an ordered
//! container guarded by a `tokio::sync::Mutex`, with a `Notify` standing in
//! for the condition-variable signaling the design notes call for, and a
//! counting `Semaphore` enforcing `MaxQueueSize` as backpressure.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use taskrelay_core::Job;
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Queue ordering discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    Fifo,
    Priority,
}

/// A job paired with the sequence number it was enqueued under, used to
/// break priority ties in favor of earlier arrivals.
struct PriorityEntry {
    seq: u64,
    job: Job,
}

impl PartialEq for PriorityEntry {
    fn eq(&self, other: &Self) -> bool {
        self.job.priority == other.job.priority && self.seq == other.seq
    }
}
impl Eq for PriorityEntry {}

impl PartialOrd for PriorityEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityEntry {
    // BinaryHeap is a max-heap: higher priority sorts first, and among equal
    // priorities the *lower* sequence number (earlier enqueue) sorts first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.job
            .priority
            .cmp(&other.job.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

enum Inner {
    Fifo(VecDeque<Job>),
    Priority(BinaryHeap<PriorityEntry>),
}

impl Inner {
    fn len(&self) -> usize {
        match self {
            Inner::Fifo(q) => q.len(),
            Inner::Priority(h) => h.len(),
        }
    }

    fn push(&mut self, job: Job, seq: u64) {
        match self {
            Inner::Fifo(q) => q.push_back(job),
            Inner::Priority(h) => h.push(PriorityEntry { seq, job }),
        }
    }

    fn pop(&mut self) -> Option<Job> {
        match self {
            Inner::Fifo(q) => q.pop_front(),
            Inner::Priority(h) => h.pop().map(|entry| entry.job),
        }
    }
}

/// A bounded channel of at most `max_size` jobs.
pub struct JobQueue {
    inner: Mutex<Inner>,
    not_empty: Notify,
    capacity: Arc<Semaphore>,
    completed: AtomicBool,
    next_seq: AtomicU64,
}

impl JobQueue {
    pub fn new(mode: QueueMode, max_size: usize) -> Self {
        let inner = match mode {
            QueueMode::Fifo => Inner::Fifo(VecDeque::with_capacity(max_size.min(1024))),
            QueueMode::Priority => Inner::Priority(BinaryHeap::with_capacity(max_size.min(1024))),
        };
        Self {
            inner: Mutex::new(inner),
            not_empty: Notify::new(),
            capacity: Arc::new(Semaphore::new(max_size)),
            completed: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Enqueue `job`. Returns `false` if the queue has been completed, or if
    /// `cancel` fires while waiting for capacity.
    pub async fn enqueue(&self, job: Job, cancel: CancellationToken) -> bool {
        if self.completed.load(Ordering::SeqCst) {
            return false;
        }

        let permit = tokio::select! {
            biased;
            permit = self.capacity.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return false, // semaphore closed underneath us
            },
            _ = cancel.cancelled() => return false,
        };

        if self.completed.load(Ordering::SeqCst) {
            drop(permit);
            return false;
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        {
            let mut inner = self.inner.lock().await;
            inner.push(job, seq);
        }
        permit.forget(); // capacity is released again on dequeue
        self.not_empty.notify_one();
        true
    }

    /// Dequeue the next job. Returns `None` iff `cancel` fires, or the queue
    /// is completed and drained.
    pub async fn dequeue(&self, cancel: CancellationToken) -> Option<Job> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(job) = inner.pop() {
                    self.capacity.add_permits(1);
                    return Some(job);
                }
                if self.completed.load(Ordering::SeqCst) {
                    return None;
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = self.not_empty.notified() => {}
            }
        }
    }

    /// Approximate current occupancy; exact only absent concurrent
    /// producers/consumers.
    pub async fn count(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Idempotent. After this, `enqueue` returns `false`; `dequeue` drains
    /// remaining items before returning `None`.
    pub fn complete(&self) {
        if !self.completed.swap(true, Ordering::SeqCst) {
            debug!("job queue marked complete");
        }
        self.not_empty.notify_waiters();
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }
}
