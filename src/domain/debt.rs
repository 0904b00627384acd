//! Derived debt/forecast views computed from the drift-history and
//! velocity projections; never persisted as primary state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtKind {
    /// Spec/plan neglect: something the spec asked for was never reflected
    /// in the plan, or locked-spec drift was never reconciled.
    Neglect,
    /// Implementation-side churn: code drifted out from under a completed task.
    Churn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtItem {
    pub component: String,
    pub kind: DebtKind,
    pub severity: crate::domain::drift::Severity,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub sticky: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebtScore {
    pub total: u32,
    pub by_component: std::collections::HashMap<String, u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VelocityTrend {
    Accelerating,
    Stable,
    Decelerating,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurndownPoint {
    pub day_index: u32,
    pub remaining_estimate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResult {
    pub trend: VelocityTrend,
    pub burndown: Vec<BurndownPoint>,
}
