//! `DriftIssue` and the composed drift `Report`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftType {
    Spec,
    Plan,
    Code,
    Policy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftIssue {
    pub drift_type: DriftType,
    pub category: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub task_id: Option<String>,
}

impl DriftIssue {
    pub fn new(
        drift_type: DriftType,
        category: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            drift_type,
            category: category.into(),
            severity,
            message: message.into(),
            task_id: None,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub issues: Vec<DriftIssue>,
}

impl Report {
    pub fn new(issues: Vec<DriftIssue>) -> Self {
        Self {
            id: Uuid::now_v7(),
            created_at: Utc::now(),
            issues,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}
