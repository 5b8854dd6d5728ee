//! Collaborator interfaces the handlers in this crate depend on: task
//! persistence, plan synthesis, and plan execution. Analogous in shape to
//! the step-level collaborators in `taskrelay-core`, but scoped to the
//! task/plan lifecycle rather than a single step.

use async_trait::async_trait;
use taskrelay_core::{AgentPlan, AgentTask, CoreError};
use tokio_util::sync::CancellationToken;

/// Loads and persists [`AgentTask`] records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get(&self, task_id: &str) -> Result<Option<AgentTask>, CoreError>;

    async fn save(&self, task: &AgentTask) -> Result<(), CoreError>;
}

/// Synthesizes an [`AgentPlan`] for a task, typically via an LLM call.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, task: &AgentTask) -> Result<AgentPlan, CoreError>;
}

/// Drives a task's plan to completion, one step at a time, via
/// `taskrelay-executor`.
#[async_trait]
pub trait ExecutorService: Send + Sync {
    async fn execute_plan(&self, task: &AgentTask, cancel: CancellationToken) -> Result<(), CoreError>;
}
