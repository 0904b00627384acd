//! `Rate`, `TimeEntry`, and the reports derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rate {
    pub id: String,
    pub name: String,
    pub hourly_rate: f64,
    pub currency: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: String,
    pub task_id: String,
    pub rate_id: String,
    /// Always `> 0`.
    pub minutes: u64,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TaxMode {
    Inclusive,
    Exclusive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxConfig {
    pub mode: TaxMode,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostReport {
    pub total_hours: f64,
    pub total_cost: f64,
    pub estimated_hours: f64,
    pub estimated_cost: f64,
    pub estimate_variance_hours: f64,
    pub estimate_variance_cost: f64,
    pub estimate_coverage_percent: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub used_hours: f64,
    pub budget_hours: f64,
    pub percent_used: f64,
    pub remaining_hours: f64,
    pub over_budget: bool,
    pub projected_hours: f64,
    pub projected_cost: f64,
}
