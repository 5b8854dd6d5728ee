//! Types produced and consumed while a single [`crate::task::PlanStep`] is
//! executed inside a sandbox container.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::task::PlanStep;

/// What happened to a single file during step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeType {
    Created,
    Modified,
    Deleted,
}

/// One recorded file-level mutation, as reported by
/// [`crate::collaborators::FileEditor::get_changes`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub change_type: FileChangeType,
    pub path: String,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
}

impl FileChange {
    /// A `Modified`/`Deleted` change lacking `old_content` carries nothing to
    /// reverse; [`crate::rollback`] must skip it rather than write garbage.
    pub fn is_rollback_skippable(&self) -> bool {
        matches!(self.change_type, FileChangeType::Modified | FileChangeType::Deleted)
            && self.old_content.is_none()
    }
}

/// A single file-level action within a [`StepActionPlan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepAction {
    CreateFile {
        file_path: String,
        request: CodeGenerationRequest,
    },
    ModifyFile {
        file_path: String,
        request: CodeGenerationRequest,
    },
    DeleteFile {
        file_path: String,
    },
}

impl StepAction {
    pub fn file_path(&self) -> &str {
        match self {
            StepAction::CreateFile { file_path, .. } => file_path,
            StepAction::ModifyFile { file_path, .. } => file_path,
            StepAction::DeleteFile { file_path } => file_path,
        }
    }
}

/// A request to synthesize or apply code. `content.is_none()` means "the LLM
/// should synthesize this"; `Some(content)` is used literally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeGenerationRequest {
    pub instructions: String,
    pub content: Option<String>,
}

impl CodeGenerationRequest {
    pub fn literal(content: impl Into<String>) -> Self {
        Self {
            instructions: String::new(),
            content: Some(content.into()),
        }
    }

    pub fn synthesize(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            content: None,
        }
    }

    pub fn is_literal(&self) -> bool {
        self.content.is_some()
    }
}

/// The analyzer's plan for executing a [`PlanStep`]: an ordered list of
/// actions plus whether tests should be generated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepActionPlan {
    pub actions: Vec<StepAction>,
    pub requires_tests: bool,
    pub main_file: Option<String>,
    pub test_file: Option<String>,
}

/// Context describing the project a step executes within.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepContext {
    pub language: String,
    pub files: Vec<String>,
    pub test_framework: Option<String>,
    pub build_tool: Option<String>,
}

/// Result of [`crate::collaborators::BuildVerifier::verify_build`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResult {
    pub success: bool,
    pub attempts: u32,
    pub errors: Vec<String>,
    pub fixes_applied: u32,
    pub duration: Duration,
    pub tool_available: bool,
    pub missing_tool: Option<String>,
}

/// Result of [`crate::collaborators::TestValidator::run_and_validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestValidationResult {
    pub all_passed: bool,
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub attempts: u32,
    pub fixes_applied: u32,
    pub duration: Duration,
}

/// Monotonically-accumulated counters and durations for one step execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub llm_calls: u32,
    pub files_created: u32,
    pub files_modified: u32,
    pub files_deleted: u32,
    pub build_attempts: u32,
    pub test_attempts: u32,
    pub analysis_duration: Duration,
    pub codegen_duration: Duration,
    pub build_duration: Duration,
    pub test_duration: Duration,
}

impl ExecutionMetrics {
    pub fn record_change(&mut self, change_type: FileChangeType) {
        match change_type {
            FileChangeType::Created => self.files_created += 1,
            FileChangeType::Modified => self.files_modified += 1,
            FileChangeType::Deleted => self.files_deleted += 1,
        }
    }
}

/// The outcome of executing one [`PlanStep`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecutionResult {
    pub success: bool,
    pub error: Option<String>,
    pub changes: Vec<FileChange>,
    pub build_result: Option<BuildResult>,
    pub test_result: Option<TestValidationResult>,
    pub action_plan: StepActionPlan,
    pub duration: Duration,
    pub metrics: ExecutionMetrics,
}

impl StepExecutionResult {
    pub fn failure(
        error: impl Into<String>,
        changes: Vec<FileChange>,
        action_plan: StepActionPlan,
        duration: Duration,
        metrics: ExecutionMetrics,
    ) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            changes,
            build_result: None,
            test_result: None,
            action_plan,
            duration,
            metrics,
        }
    }
}

/// Identifies which ephemeral sandbox a step executes against. Opaque to
/// everything but the container collaborator.
pub type ContainerId = String;

/// Convenience accessor used by handlers that need to reference the step a
/// result came from without threading extra context through.
pub fn step_label(step: &PlanStep) -> String {
    format!("{} ({})", step.id, step.title)
}
