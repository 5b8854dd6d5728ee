//! Shared error kinds for the job fabric and step executor.

use thiserror::Error;

/// Errors surfaced by job handlers, the step executor, and their
/// collaborators.
///
/// Variants map onto the error kinds named in the design: `InputInvalid` and
/// `ToolUnavailable` are always non-retriable; `Transient` is retriable;
/// `Cancelled` must never be converted into a retry.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InputInvalid(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("required tool unavailable: {missing_tool} ({install_hint})")]
    ToolUnavailable {
        missing_tool: String,
        install_hint: String,
    },

    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    #[error("no handler registered for job type: {0}")]
    NoHandler(String),
}

impl CoreError {
    /// Whether a [`crate::job::JobResult::Failure`] built from this error
    /// should request a retry.
    pub fn should_retry(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, CoreError::Cancelled(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
