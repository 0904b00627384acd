//! `ExecutionState`: the per-project mapping from task identifier to
//! `TaskResult`, and the task lifecycle enum the state machine drives.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Blocked,
    Done,
    Verified,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
            TaskStatus::Verified => "verified",
        }
    }

    pub fn is_done_or_verified(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Verified)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalRef {
    pub reference_id: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskStatus,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub elapsed_minutes: u64,
    #[serde(default)]
    pub rate_id: Option<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub external_refs: HashMap<String, ExternalRef>,
    #[serde(default)]
    pub path: Option<String>,
}

impl TaskResult {
    pub fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            owner: None,
            started_at: None,
            elapsed_minutes: 0,
            rate_id: None,
            evidence: Vec::new(),
            external_refs: HashMap::new(),
            path: None,
        }
    }
}

impl Default for TaskResult {
    fn default() -> Self {
        Self::pending()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub project_id: String,
    #[serde(default)]
    pub results: HashMap<String, TaskResult>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionState {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            results: HashMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Gets (or lazily materializes as `pending`) the result for `task_id`.
    pub fn result_or_default(&self, task_id: &str) -> TaskResult {
        self.results.get(task_id).cloned().unwrap_or_default()
    }

    pub fn dependency_satisfied(&self, task_id: &str) -> bool {
        self.results
            .get(task_id)
            .map(|r| r.status.is_done_or_verified())
            .unwrap_or(false)
    }

    pub fn wip_count(&self) -> usize {
        self.results
            .values()
            .filter(|r| r.status == TaskStatus::InProgress)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_task_defaults_to_pending_and_unsatisfied() {
        let state = ExecutionState::new("p1");
        assert_eq!(state.result_or_default("task-r1").status, TaskStatus::Pending);
        assert!(!state.dependency_satisfied("task-r1"));
    }

    #[test]
    fn wip_count_only_counts_in_progress() {
        let mut state = ExecutionState::new("p1");
        let mut r1 = TaskResult::pending();
        r1.status = TaskStatus::InProgress;
        state.results.insert("task-r1".into(), r1);
        state.results.insert("task-r2".into(), TaskResult::pending());
        assert_eq!(state.wip_count(), 1);
    }
}
