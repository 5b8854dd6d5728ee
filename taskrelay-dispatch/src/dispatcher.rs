//! Registers handlers by type, deduplicates and enqueues jobs, and tracks
//! cancellation handles for active jobs.

use std::collections::HashMap;
use std::sync::Arc;

use taskrelay_core::{Job, JobHandler, JobId, JobStatusInfo};
use taskrelay_queue::JobQueue;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::dedup::DeduplicationIndex;
use crate::status::JobStatusStore;

/// Façade that accepts jobs, deduplicates them, and enqueues them for the
/// processor.
pub struct JobDispatcher {
    handlers: tokio::sync::RwLock<HashMap<String, Arc<dyn JobHandler>>>,
    active_jobs: tokio::sync::RwLock<HashMap<JobId, CancellationToken>>,
    queue: Arc<JobQueue>,
    status_store: Arc<JobStatusStore>,
    dedup: Arc<DeduplicationIndex>,
}

impl JobDispatcher {
    pub fn new(queue: Arc<JobQueue>, status_store: Arc<JobStatusStore>, dedup: Arc<DeduplicationIndex>) -> Self {
        Self {
            handlers: tokio::sync::RwLock::new(HashMap::new()),
            active_jobs: tokio::sync::RwLock::new(HashMap::new()),
            queue,
            status_store,
            dedup,
        }
    }

    /// First registration for a type wins; later ones are ignored and
    /// logged at warn level.
    pub async fn register_handler(&self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type().to_string();
        let mut handlers = self.handlers.write().await;
        if handlers.contains_key(&job_type) {
            warn!(job_type, "handler already registered for this job type, ignoring");
            return;
        }
        handlers.insert(job_type, handler);
    }

    pub async fn get_handler(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.read().await.get(job_type).cloned()
    }

    /// Accept `job` for execution. Returns `false` if there is no handler
    /// for its type, or the queue refused it (e.g. completed).
    ///
    /// A job with an `idempotency_key` already owned by an in-flight job is
    /// treated as "accepted — merged": this returns `true` without
    /// enqueueing a second copy. Registration in the dedup index is the
    /// same atomic test-and-set that performs the in-flight check, so there
    /// is no separate read-then-write race window.
    pub async fn dispatch(&self, job: Job) -> bool {
        if self.get_handler(&job.job_type).await.is_none() {
            return false;
        }

        if let Some(key) = job.idempotency_key.as_deref() {
            if !self.dedup.register(job.id, key).await {
                return true; // merged into the in-flight job owning this key
            }
        }

        let source = job.metadata.get("source").cloned().unwrap_or_else(|| "dispatcher".to_string());

        if !self.queue.enqueue(job.clone(), CancellationToken::new()).await {
            if let Some(key) = job.idempotency_key.as_deref() {
                self.dedup.unregister(job.id).await;
                let _ = key;
            }
            return false;
        }

        self.status_store.set(JobStatusInfo::queued(&job, source)).await;
        true
    }

    /// Register the cancellation handle for a job the processor has begun
    /// running.
    pub async fn register_active_job(&self, job_id: JobId, token: CancellationToken) {
        self.active_jobs.write().await.insert(job_id, token);
    }

    /// Cancel a running job. Returns `false` if the job is unknown (never
    /// started, or already completed — removal is eventual).
    pub async fn cancel_job(&self, job_id: JobId) -> bool {
        let active = self.active_jobs.read().await;
        match active.get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Called by the processor once a job reaches a terminal status.
    pub async fn remove_active_job(&self, job_id: JobId) {
        self.active_jobs.write().await.remove(&job_id);
    }

    pub(crate) fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub(crate) fn status_store(&self) -> &Arc<JobStatusStore> {
        &self.status_store
    }
}
