//! The worker-pool runtime: one dequeue loop handing jobs to a bounded set
//! of concurrent workers, classifying outcomes, and driving retries.

use std::sync::Arc;
use std::time::Duration;

use taskrelay_core::{CoreError, Job, JobResult, JobStatusInfo};
use taskrelay_dispatch::{DeduplicationIndex, JobDispatcher, JobStatusStore};
use taskrelay_queue::JobQueue;
use taskrelay_resilience::{RetryPolicy, ShutdownCoordinator};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runtime configuration for a [`JobProcessor`].
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub max_concurrency: usize,
    pub shutdown_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Dequeues jobs, runs them through their registered handler with bounded
/// concurrency, and classifies the outcome into a status transition and an
/// optional retry.
pub struct JobProcessor {
    queue: Arc<JobQueue>,
    dispatcher: Arc<JobDispatcher>,
    status_store: Arc<JobStatusStore>,
    dedup: Arc<DeduplicationIndex>,
    retry_policy: RetryPolicy,
    worker_slots: Arc<Semaphore>,
    shutdown: Arc<ShutdownCoordinator>,
    config: ProcessorConfig,
}

impl JobProcessor {
    pub fn new(
        queue: Arc<JobQueue>,
        dispatcher: Arc<JobDispatcher>,
        status_store: Arc<JobStatusStore>,
        dedup: Arc<DeduplicationIndex>,
        retry_policy: RetryPolicy,
        shutdown: Arc<ShutdownCoordinator>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            status_store,
            dedup,
            retry_policy,
            worker_slots: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            shutdown,
            config,
        }
    }

    /// Runs the dequeue loop until the shutdown token fires and the queue is
    /// drained. Each job is handed to a free worker slot and processed on
    /// its own task. Returns once every spawned worker has finished, which
    /// may be before [`ShutdownCoordinator::shutdown`]'s timeout elapses.
    pub async fn run(self: Arc<Self>) {
        let mut workers = Vec::new();

        loop {
            let job = match self.queue.dequeue(self.shutdown.token()).await {
                Some(job) => job,
                None => break,
            };

            let permit = match self.worker_slots.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break, // semaphore closed, process is tearing down
            };

            let this = self.clone();
            workers.push(tokio::spawn(async move {
                let _permit = permit;
                this.run_job(job).await;
            }));
        }

        for worker in workers {
            let _ = worker.await;
        }
    }

    async fn run_job(&self, job: Job) {
        let _guard = self.shutdown.job_started();
        let job_id = job.id;

        let info = self.status_store.get(job_id).await.unwrap_or_else(|| JobStatusInfo::queued(&job, "processor"));
        self.status_store.set(info.running()).await;

        let cancel = self.shutdown.job_cancellation_token().child_token();
        self.dispatcher.register_active_job(job_id, cancel.clone()).await;

        let outcome = match self.dispatcher.get_handler(&job.job_type).await {
            Some(handler) => handler.execute(&job, cancel.clone()).await,
            None => Err(CoreError::NoHandler(job.job_type.clone())),
        };

        self.apply_outcome(job, outcome, cancel).await;
        self.dispatcher.remove_active_job(job_id).await;
    }

    async fn apply_outcome(&self, job: Job, outcome: Result<JobResult, CoreError>, cancel: CancellationToken) {
        let job_id = job.id;

        let (handler_should_retry, failure_message) = match &outcome {
            Ok(JobResult::Success(_)) => {
                info!(%job_id, job_type = %job.job_type, "job succeeded");
                let info = self.status_store.get(job_id).await.unwrap_or_else(|| JobStatusInfo::queued(&job, "processor"));
                self.status_store.set(info.succeeded()).await;
                self.dedup.unregister(job_id).await;
                return;
            }
            Ok(JobResult::Failure {
                should_retry,
                error_message,
                ..
            }) => (*should_retry, error_message.clone()),
            Err(err) if err.is_cancellation() => {
                warn!(%job_id, job_type = %job.job_type, "job cancelled");
                let info = self.status_store.get(job_id).await.unwrap_or_else(|| JobStatusInfo::queued(&job, "processor"));
                self.status_store.set(info.cancelled()).await;
                self.dedup.unregister(job_id).await;
                return;
            }
            Err(err) => (err.should_retry(), err.to_string()),
        };

        if self.retry_policy.should_retry(job.retry_count, job.max_retries, handler_should_retry) {
            self.schedule_retry(job, failure_message, cancel).await;
        } else {
            error!(%job_id, job_type = %job.job_type, reason = %failure_message, "job failed");
            let info = self.status_store.get(job_id).await.unwrap_or_else(|| JobStatusInfo::queued(&job, "processor"));
            self.status_store.set(info.failed(failure_message)).await;
            self.dedup.unregister(job_id).await;
        }
    }

    async fn schedule_retry(&self, job: Job, reason: String, cancel: CancellationToken) {
        let job_id = job.id;
        let delay = self.retry_policy.delay_for_attempt(job.retry_count);

        let info = self.status_store.get(job_id).await.unwrap_or_else(|| JobStatusInfo::queued(&job, "processor"));
        self.status_store.set(info.retrying(reason)).await;

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                let retry_job = job.create_retry_job();
                let info = self.status_store.get(job_id).await.unwrap_or_else(|| JobStatusInfo::queued(&job, "processor"));
                self.status_store.set(info.requeued()).await;

                // Re-enqueue through the queue directly: the handler and
                // dedup entry are already registered from the first pass.
                if !self.queue.enqueue(retry_job, CancellationToken::new()).await {
                    let info = self.status_store.get(job_id).await.unwrap_or_else(|| JobStatusInfo::queued(&job, "processor"));
                    self.status_store.set(info.failed("queue closed before retry could be re-enqueued")).await;
                    self.dedup.unregister(job_id).await;
                }
            }
            _ = cancel.cancelled() => {
                let info = self.status_store.get(job_id).await.unwrap_or_else(|| JobStatusInfo::queued(&job, "processor"));
                self.status_store.set(info.cancelled()).await;
                self.dedup.unregister(job_id).await;
            }
        }
    }

    pub fn active_job_count(&self) -> u32 {
        self.shutdown.active_job_count()
    }
}
