//! Drives a planned task's steps to completion.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskrelay_core::{CoreError, Job, JobHandler, JobResult, TaskStatus};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::collaborators::{ExecutorService, TaskStore};

#[derive(Debug, Serialize, Deserialize)]
struct TaskPayload {
    #[serde(rename = "TaskId")]
    task_id: String,
}

/// Loads a planned task, runs its plan through an [`ExecutorService`], and
/// marks it completed. A cancellation from the executor propagates as-is;
/// every other executor error is reported as a retriable failure.
pub struct ExecutePlanJobHandler {
    store: Arc<dyn TaskStore>,
    executor: Arc<dyn ExecutorService>,
}

impl ExecutePlanJobHandler {
    pub fn new(store: Arc<dyn TaskStore>, executor: Arc<dyn ExecutorService>) -> Self {
        Self { store, executor }
    }
}

#[async_trait]
impl JobHandler for ExecutePlanJobHandler {
    fn job_type(&self) -> &str {
        "ExecutePlan"
    }

    async fn execute(&self, job: &Job, cancel: CancellationToken) -> Result<JobResult, CoreError> {
        let payload: TaskPayload = match serde_json::from_slice(&job.payload) {
            Ok(payload) => payload,
            Err(err) => return Ok(JobResult::retriable_failure(format!("invalid ExecutePlan payload: {err}"))),
        };

        let mut task = self
            .store
            .get(&payload.task_id)
            .await?
            .ok_or_else(|| CoreError::InputInvalid(format!("task not found: {}", payload.task_id)))?;

        if task.plan.is_none() {
            return Err(CoreError::InputInvalid(format!("task has no plan: {}", payload.task_id)));
        }

        task.status = TaskStatus::Executing;
        self.store.save(&task).await?;

        match self.executor.execute_plan(&task, cancel).await {
            Ok(()) => {
                task.status = TaskStatus::Completed;
                self.store.save(&task).await?;
                info!(task_id = %task.id, "plan executed, task completed");
                Ok(JobResult::success(serde_json::json!({ "task_id": task.id })))
            }
            Err(err) if err.is_cancellation() => Err(err),
            Err(err) => Ok(JobResult::retriable_failure(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use taskrelay_core::{AgentPlan, AgentTask};

    struct InMemoryStore {
        tasks: Mutex<std::collections::HashMap<String, AgentTask>>,
    }

    #[async_trait]
    impl TaskStore for InMemoryStore {
        async fn get(&self, task_id: &str) -> Result<Option<AgentTask>, CoreError> {
            Ok(self.tasks.lock().unwrap().get(task_id).cloned())
        }
        async fn save(&self, task: &AgentTask) -> Result<(), CoreError> {
            self.tasks.lock().unwrap().insert(task.id.clone(), task.clone());
            Ok(())
        }
    }

    struct ScriptedExecutor {
        outcome: Result<(), CoreError>,
    }

    #[async_trait]
    impl ExecutorService for ScriptedExecutor {
        async fn execute_plan(&self, _task: &AgentTask, _cancel: CancellationToken) -> Result<(), CoreError> {
            self.outcome.clone()
        }
    }

    fn planned_task() -> AgentTask {
        let mut task = AgentTask::new("acme", "widgets", 7);
        task.plan = Some(AgentPlan {
            problem_summary: "fix it".to_string(),
            steps: vec![],
        });
        task.status = TaskStatus::Planned;
        task
    }

    fn store_with(task: AgentTask) -> (Arc<InMemoryStore>, String) {
        let task_id = task.id.clone();
        let mut tasks = std::collections::HashMap::new();
        tasks.insert(task_id.clone(), task);
        (Arc::new(InMemoryStore { tasks: Mutex::new(tasks) }), task_id)
    }

    #[tokio::test]
    async fn task_without_a_plan_is_non_retriable() {
        let mut task = AgentTask::new("acme", "widgets", 8);
        task.plan = None;
        let (store, task_id) = store_with(task);
        let handler = ExecutePlanJobHandler::new(
            store,
            Arc::new(ScriptedExecutor { outcome: Ok(()) }),
        );

        let payload = serde_json::to_vec(&TaskPayload { task_id }).unwrap();
        let job = Job::new("ExecutePlan", payload);
        let err = handler.execute(&job, CancellationToken::new()).await.unwrap_err();
        assert!(!err.should_retry());
    }

    #[tokio::test]
    async fn success_marks_task_completed() {
        let (store, task_id) = store_with(planned_task());
        let handler = ExecutePlanJobHandler::new(
            store.clone(),
            Arc::new(ScriptedExecutor { outcome: Ok(()) }),
        );

        let payload = serde_json::to_vec(&TaskPayload { task_id: task_id.clone() }).unwrap();
        let job = Job::new("ExecutePlan", payload);
        let result = handler.execute(&job, CancellationToken::new()).await.unwrap();
        assert!(result.is_success());

        let saved = store.get(&task_id).await.unwrap().unwrap();
        assert_eq!(saved.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn cancellation_propagates_instead_of_becoming_a_failure() {
        let (store, task_id) = store_with(planned_task());
        let handler = ExecutePlanJobHandler::new(
            store,
            Arc::new(ScriptedExecutor {
                outcome: Err(CoreError::Cancelled("shutdown".to_string())),
            }),
        );

        let payload = serde_json::to_vec(&TaskPayload { task_id }).unwrap();
        let job = Job::new("ExecutePlan", payload);
        let err = handler.execute(&job, CancellationToken::new()).await.unwrap_err();
        assert!(err.is_cancellation());
    }

    #[tokio::test]
    async fn other_executor_errors_become_retriable_failures() {
        let (store, task_id) = store_with(planned_task());
        let handler = ExecutePlanJobHandler::new(
            store,
            Arc::new(ScriptedExecutor {
                outcome: Err(CoreError::ToolUnavailable {
                    missing_tool: "cargo".to_string(),
                    install_hint: "install rustup".to_string(),
                }),
            }),
        );

        let payload = serde_json::to_vec(&TaskPayload { task_id }).unwrap();
        let job = Job::new("ExecutePlan", payload);
        let result = handler.execute(&job, CancellationToken::new()).await.unwrap();
        match result {
            JobResult::Failure { should_retry, .. } => assert!(should_retry),
            JobResult::Success(_) => panic!("expected failure"),
        }
    }
}
