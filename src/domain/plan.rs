//! `Plan` and `Task`: the derived, reconcilable work breakdown for a spec.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// By convention `task-<requirement-id>` for derived tasks, slug-derived
    /// for AI-generated ones.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: crate::domain::spec::Priority,
    #[serde(default)]
    pub estimate: String,
    pub feature_id: String,
    /// Task identifiers, optionally `project:task-id` for cross-repo deps.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, feature_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            priority: crate::domain::spec::Priority::Medium,
            estimate: String::new(),
            feature_id: feature_id.into(),
            depends_on: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// `project:task-id` dependencies, split into `(project, task_id)`.
    pub fn cross_repo_dependency(dep: &str) -> Option<(&str, &str)> {
        dep.split_once(':')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Changes on every reconciliation.
    pub id: String,
    pub spec_id: String,
    pub approval_status: ApprovalStatus,
    pub tasks: Vec<Task>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(id: impl Into<String>, spec_id: impl Into<String>, tasks: Vec<Task>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            spec_id: spec_id.into(),
            approval_status: ApprovalStatus::Pending,
            tasks,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.id.as_str()).collect()
    }
}
