//! The job record and its lifecycle types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, unique job identifier.
pub type JobId = Uuid;

/// A unit of background work with a type, payload, priority, and retry budget.
///
/// Jobs are immutable once enqueued: a retry produces a *new* record via
/// [`Job::create_retry_job`] rather than mutating this one in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: String,
    pub payload: Vec<u8>,
    pub priority: i32,
    pub max_retries: u32,
    pub retry_count: u32,
    pub idempotency_key: Option<String>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Build a new job with `retry_count = 0`.
    pub fn new(job_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.into(),
            payload,
            priority: 0,
            max_retries: 0,
            retry_count: 0,
            idempotency_key: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether this job has retry budget remaining.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Create the retry job record: same id, type, payload, priority,
    /// max_retries, and metadata, with `retry_count` incremented by one.
    ///
    /// Panics in debug builds if called when no retry budget remains, since
    /// that invariant should have been checked by the caller via
    /// [`crate::retry::RetryDecision`].
    pub fn create_retry_job(&self) -> Self {
        debug_assert!(
            self.retry_count < self.max_retries,
            "create_retry_job called with no retry budget remaining"
        );
        Self {
            id: self.id,
            job_type: self.job_type.clone(),
            payload: self.payload.clone(),
            priority: self.priority,
            max_retries: self.max_retries,
            retry_count: self.retry_count + 1,
            idempotency_key: self.idempotency_key.clone(),
            metadata: self.metadata.clone(),
            created_at: self.created_at,
        }
    }
}

/// Outcome of a single handler invocation.
#[derive(Debug, Clone)]
pub enum JobResult {
    Success(serde_json::Value),
    Failure {
        error_message: String,
        cause: Option<String>,
        should_retry: bool,
    },
}

impl JobResult {
    pub fn success(data: serde_json::Value) -> Self {
        Self::Success(data)
    }

    pub fn retriable_failure(error_message: impl Into<String>) -> Self {
        Self::Failure {
            error_message: error_message.into(),
            cause: None,
            should_retry: true,
        }
    }

    pub fn final_failure(error_message: impl Into<String>) -> Self {
        Self::Failure {
            error_message: error_message.into(),
            cause: None,
            should_retry: false,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Lifecycle status of a job as recorded in the [`crate::status::JobStatusStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Retrying,
}

impl JobStatus {
    /// Whether `self -> next` is a legal transition.
    ///
    /// `Queued -> Running -> {Succeeded | Failed | Retrying | Cancelled}`;
    /// `Retrying -> Queued` only.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Retrying)
                | (Running, Cancelled)
                | (Retrying, Queued)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// Snapshot of a job's lifecycle state, stored in the status store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusInfo {
    pub job_id: JobId,
    pub job_type: String,
    pub status: JobStatus,
    pub source: String,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl JobStatusInfo {
    pub fn queued(job: &Job, source: impl Into<String>) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type.clone(),
            status: JobStatus::Queued,
            source: source.into(),
            attempts: job.retry_count,
            started_at: None,
            completed_at: None,
            last_error: None,
        }
    }

    pub fn running(mut self) -> Self {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        self
    }

    pub fn succeeded(mut self) -> Self {
        self.status = JobStatus::Succeeded;
        self.completed_at = Some(Utc::now());
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.last_error = Some(error.into());
        self
    }

    pub fn cancelled(mut self) -> Self {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        self
    }

    /// Marks the current attempt as retrying; does not yet move the job
    /// back to `Queued` (the processor does that once the backoff delay
    /// elapses and the retry job is re-enqueued).
    pub fn retrying(mut self, error: impl Into<String>) -> Self {
        self.status = JobStatus::Retrying;
        self.last_error = Some(error.into());
        self.attempts += 1;
        self
    }

    /// Moves a `Retrying` record back to `Queued` ahead of re-enqueueing.
    pub fn requeued(mut self) -> Self {
        self.status = JobStatus::Queued;
        self.started_at = None;
        self.completed_at = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_job_preserves_identity_and_increments_count() {
        let job = Job::new("GeneratePlan", b"{}".to_vec())
            .with_priority(5)
            .with_max_retries(3)
            .with_metadata("owner", "acme");

        let retry = job.create_retry_job();

        assert_eq!(retry.id, job.id);
        assert_eq!(retry.job_type, job.job_type);
        assert_eq!(retry.payload, job.payload);
        assert_eq!(retry.priority, job.priority);
        assert_eq!(retry.max_retries, job.max_retries);
        assert_eq!(retry.metadata, job.metadata);
        assert_eq!(retry.retry_count, job.retry_count + 1);
    }

    #[test]
    fn status_transitions_are_restricted() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Retrying));
        assert!(JobStatus::Retrying.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Succeeded));
        assert!(!JobStatus::Succeeded.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn can_retry_respects_budget() {
        let job = Job::new("x", vec![]).with_max_retries(1);
        assert!(job.can_retry());
        let retried = job.create_retry_job();
        assert!(!retried.can_retry());
    }

    #[test]
    fn status_info_builders_chain_through_a_retry_cycle() {
        let job = Job::new("ExecutePlan", vec![]).with_max_retries(1);
        let info = JobStatusInfo::queued(&job, "webhook").running().retrying("transient failure").requeued();
        assert_eq!(info.status, JobStatus::Queued);
        assert_eq!(info.attempts, 1);
        assert!(info.started_at.is_none());
    }
}
