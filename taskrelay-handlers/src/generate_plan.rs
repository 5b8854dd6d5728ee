//! Turns an issue-backed task into a plan and hands off to `ExecutePlan`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskrelay_core::{CoreError, Job, JobHandler, JobResult, TaskStatus};
use taskrelay_dispatch::JobDispatcher;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::collaborators::{Planner, TaskStore};

#[derive(Debug, Serialize, Deserialize)]
struct TaskPayload {
    #[serde(rename = "TaskId")]
    task_id: String,
}

/// Loads the task, asks the planner for an [`taskrelay_core::AgentPlan`],
/// saves it back, and enqueues the follow-up `ExecutePlan` job.
pub struct GeneratePlanJobHandler {
    store: Arc<dyn TaskStore>,
    planner: Arc<dyn Planner>,
    dispatcher: Arc<JobDispatcher>,
}

impl GeneratePlanJobHandler {
    pub fn new(store: Arc<dyn TaskStore>, planner: Arc<dyn Planner>, dispatcher: Arc<JobDispatcher>) -> Self {
        Self { store, planner, dispatcher }
    }
}

#[async_trait]
impl JobHandler for GeneratePlanJobHandler {
    fn job_type(&self) -> &str {
        "GeneratePlan"
    }

    async fn execute(&self, job: &Job, _cancel: CancellationToken) -> Result<JobResult, CoreError> {
        let payload: TaskPayload = match serde_json::from_slice(&job.payload) {
            Ok(payload) => payload,
            Err(err) => return Ok(JobResult::retriable_failure(format!("invalid GeneratePlan payload: {err}"))),
        };

        let mut task = self
            .store
            .get(&payload.task_id)
            .await?
            .ok_or_else(|| CoreError::InputInvalid(format!("task not found: {}", payload.task_id)))?;

        let plan = self.planner.plan(&task).await?;
        task.plan = Some(plan);
        task.status = TaskStatus::Planned;
        self.store.save(&task).await?;

        let next_payload = serde_json::to_vec(&TaskPayload {
            task_id: task.id.clone(),
        })
        .map_err(|err| CoreError::Transient(format!("failed to encode ExecutePlan payload: {err}")))?;

        let next_job = Job::new("ExecutePlan", next_payload).with_idempotency_key(format!("execute-plan:{}", task.id));

        if !self.dispatcher.dispatch(next_job).await {
            return Ok(JobResult::retriable_failure("failed to enqueue ExecutePlan job"));
        }

        info!(task_id = %task.id, "plan generated, ExecutePlan enqueued");
        Ok(JobResult::success(serde_json::json!({ "task_id": task.id })))
    }
}
