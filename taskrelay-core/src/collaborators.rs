//! External-collaborator interfaces consumed by the step executor.
//!
//! Only the contracts live here: the LLM prompt text, the concrete container
//! driver, and the build/test tool detection logic are implementation
//! details left to whoever wires a [`StepExecutorDeps`] together.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::step::{
    BuildResult, CodeGenerationRequest, ContainerId, FileChange, StepActionPlan, StepContext,
    TestValidationResult,
};
use crate::task::PlanStep;

/// Outcome of running a single command inside the sandbox container.
#[derive(Debug, Clone)]
pub struct ContainerExecResult {
    pub exit_code: i32,
    pub output: String,
    pub error: String,
}

/// Sandbox container collaborator: an opaque execution environment
/// identified by [`ContainerId`], manipulated only through this interface.
#[async_trait]
pub trait ContainerClient: Send + Sync {
    async fn execute_in_container(
        &self,
        id: &ContainerId,
        cmd: &str,
        args: &[String],
        cancel: CancellationToken,
    ) -> Result<ContainerExecResult, CoreError>;

    async fn read_file_in_container(&self, id: &ContainerId, path: &str) -> Result<String, CoreError>;

    async fn write_file_in_container(&self, id: &ContainerId, path: &str, content: &str) -> Result<(), CoreError>;

    async fn file_exists_in_container(&self, id: &ContainerId, path: &str) -> Result<bool, CoreError>;
}

/// Records and replays file-level mutations against a sandbox container.
///
/// The change log is per-executor and accessed by a single worker at a
/// time; callers own its lifecycle via [`FileEditor::clear_changes`].
#[async_trait]
pub trait FileEditor: Send + Sync {
    async fn create_file(&self, id: &ContainerId, path: &str, content: &str) -> Result<(), CoreError>;

    /// `transform` is the full new file content to write, replacing whatever
    /// is currently at `path`.
    async fn modify_file(
        &self,
        id: &ContainerId,
        path: &str,
        transform: &str,
    ) -> Result<(), CoreError>;

    async fn delete_file(&self, id: &ContainerId, path: &str) -> Result<(), CoreError>;

    /// Changes recorded since the last [`FileEditor::clear_changes`] call.
    fn get_changes(&self) -> Vec<FileChange>;

    /// Clears the recorded change log. Failures here (e.g. the log can't be
    /// reset cleanly) are surfaced by the caller as [`CoreError::RollbackFailed`].
    fn clear_changes(&self) -> Result<(), CoreError>;
}

/// Turns a [`PlanStep`] plus project context into an ordered action plan.
#[async_trait]
pub trait StepAnalyzer: Send + Sync {
    async fn analyze(&self, step: &PlanStep, context: &StepContext) -> Result<StepActionPlan, CoreError>;
}

/// Synthesizes file content for an action whose request carries no literal
/// content.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &CodeGenerationRequest,
        prior_content: Option<&str>,
    ) -> Result<String, CoreError>;
}

/// Detects the build tool, runs the build, and repairs failures via the LLM
/// up to `max_retries` times.
#[async_trait]
pub trait BuildVerifier: Send + Sync {
    async fn verify_build(&self, id: &ContainerId, max_retries: u32) -> Result<BuildResult, CoreError>;
}

/// Detects the test framework, runs the suite, and repairs failures via the
/// LLM up to `max_retries` times.
#[async_trait]
pub trait TestValidator: Send + Sync {
    async fn run_and_validate(&self, id: &ContainerId, max_retries: u32) -> Result<TestValidationResult, CoreError>;
}

/// Best-effort static-analysis / lint pass. Failures here never fail a step.
#[async_trait]
pub trait QualityChecker: Send + Sync {
    async fn check_and_fix(&self, id: &ContainerId) -> Result<(), CoreError>;
}
