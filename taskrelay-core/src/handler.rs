//! The one trait every job handler implements.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::job::{Job, JobResult};

/// User-supplied logic bound to a job type.
///
/// `execute` returns [`CoreError::Cancelled`] to signal a cooperative abort;
/// the processor treats that distinctly from every other failure and never
/// schedules a retry for it.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The routing key this handler is registered under.
    fn job_type(&self) -> &str;

    async fn execute(&self, job: &Job, cancel: CancellationToken) -> Result<JobResult, CoreError>;
}
