//! Agent tasks and plans: the unit of work a `GeneratePlan`/`ExecutePlan`
//! job pair carries from issue to pull request.

use serde::{Deserialize, Serialize};

/// Status of an [`AgentTask`] through planning and execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    PendingPlanning,
    Planned,
    Executing,
    Completed,
    Failed,
}

/// A single actionable item within an [`AgentPlan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub title: String,
    pub details: String,
    pub done: bool,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, title: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            details: details.into(),
            done: false,
        }
    }
}

/// The LLM-authored plan for resolving an issue: a summary plus ordered steps.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentPlan {
    pub problem_summary: String,
    pub steps: Vec<PlanStep>,
}

/// A task backed by a single source-control issue, identified path-like as
/// `{owner}/{repo}/issues/{n}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: String,
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
    pub status: TaskStatus,
    pub plan: Option<AgentPlan>,
}

impl AgentTask {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, issue_number: u64) -> Self {
        let owner = owner.into();
        let repo = repo.into();
        let id = format!("{owner}/{repo}/issues/{issue_number}");
        Self {
            id,
            owner,
            repo,
            issue_number,
            status: TaskStatus::PendingPlanning,
            plan: None,
        }
    }

    /// Parse a task id of the form `{owner}/{repo}/issues/{n}`.
    pub fn parse_id(id: &str) -> Option<(String, String, u64)> {
        let parts: Vec<&str> = id.split('/').collect();
        if parts.len() != 4 || parts[2] != "issues" {
            return None;
        }
        let issue_number = parts[3].parse().ok()?;
        Some((parts[0].to_string(), parts[1].to_string(), issue_number))
    }
}
