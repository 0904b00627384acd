//! The billing reconciler: deduplicated time aggregation between
//! `TimeEntry` records and `TaskResult.elapsed_minutes`, estimate variance,
//! and budget projection.

use std::collections::HashSet;

use crate::domain::{CostReport, PolicyConfig, TaxConfig, TaxMode};
use crate::domain::{BudgetStatus, Plan};
use crate::domain::ExecutionState;
use crate::workspace::types::{RatesFile, TimeEntriesFile};

/// Parses a human duration string (`"4h"`, `"2d"`, `"30m"`) into hours.
/// A working day is treated as 8 hours. Returns `None` for anything that
/// does not parse.
pub fn parse_estimate_hours(estimate: &str) -> Option<f64> {
    let s = estimate.trim();
    if s.len() < 2 {
        return None;
    }
    let (num_part, unit) = s.split_at(s.len() - 1);
    let num: f64 = num_part.parse().ok()?;
    match unit {
        "h" => Some(num),
        "d" => Some(num * 8.0),
        "m" => Some(num / 60.0),
        _ => None,
    }
}

pub struct BillingReconciler;

struct Aggregate {
    total_hours: f64,
    total_cost: f64,
    reported_task_ids: HashSet<String>,
}

impl BillingReconciler {
    /// Aggregates time without double-counting: `TimeEntry` records take
    /// precedence per task identifier; `TaskResult.elapsed_minutes`
    /// contributes only for tasks no `TimeEntry` already covered.
    fn aggregate(
        plan: &Plan,
        state: &ExecutionState,
        rates: &RatesFile,
        time_entries: &TimeEntriesFile,
        filter_task_id: Option<&str>,
    ) -> Aggregate {
        let mut seen = HashSet::new();
        let mut total_hours = 0.0;
        let mut total_cost = 0.0;

        for entry in &time_entries.entries {
            if let Some(filter) = filter_task_id {
                if entry.task_id != filter {
                    continue;
                }
            }
            let Some(rate) = rates.rates.iter().find(|r| r.id == entry.rate_id) else {
                continue; // stale rate identifier
            };
            seen.insert(entry.task_id.clone());
            let hours = entry.minutes as f64 / 60.0;
            total_hours += hours;
            total_cost += hours * rate.hourly_rate;
        }

        let default_rate = rates.default_rate();
        for task in &plan.tasks {
            if let Some(filter) = filter_task_id {
                if task.id != filter {
                    continue;
                }
            }
            if seen.contains(&task.id) {
                continue;
            }
            let Some(result) = state.results.get(&task.id) else {
                continue;
            };
            if result.elapsed_minutes == 0 {
                continue;
            }
            let rate = result
                .rate_id
                .as_deref()
                .and_then(|id| rates.rates.iter().find(|r| r.id == id))
                .or(default_rate);
            let Some(rate) = rate else {
                continue;
            };
            seen.insert(task.id.clone());
            let hours = result.elapsed_minutes as f64 / 60.0;
            total_hours += hours;
            total_cost += hours * rate.hourly_rate;
        }

        Aggregate {
            total_hours,
            total_cost,
            reported_task_ids: seen,
        }
    }

    pub fn cost_report(
        plan: &Plan,
        state: &ExecutionState,
        rates: &RatesFile,
        time_entries: &TimeEntriesFile,
        tax: Option<&TaxConfig>,
        filter_task_id: Option<&str>,
    ) -> CostReport {
        let agg = Self::aggregate(plan, state, rates, time_entries, filter_task_id);
        let mut total_cost = agg.total_cost;
        if let Some(tax) = tax {
            if tax.mode == TaxMode::Exclusive {
                total_cost += total_cost * tax.percent / 100.0;
            }
        }

        let default_rate = rates.default_rate();
        let total_hours_estimated_in_plan: f64 = plan
            .tasks
            .iter()
            .filter_map(|t| parse_estimate_hours(&t.estimate))
            .sum();
        let estimated_hours: f64 = plan
            .tasks
            .iter()
            .filter(|t| agg.reported_task_ids.contains(&t.id))
            .filter_map(|t| parse_estimate_hours(&t.estimate))
            .sum();
        let estimated_cost = default_rate.map(|r| estimated_hours * r.hourly_rate).unwrap_or(0.0);

        let estimate_coverage_percent = if total_hours_estimated_in_plan > 0.0 {
            estimated_hours / total_hours_estimated_in_plan * 100.0
        } else {
            0.0
        };

        CostReport {
            total_hours: agg.total_hours,
            total_cost,
            estimated_hours,
            estimated_cost,
            estimate_variance_hours: agg.total_hours - estimated_hours,
            estimate_variance_cost: agg.total_cost - estimated_cost,
            estimate_coverage_percent,
        }
    }

    pub fn budget_status(
        plan: &Plan,
        state: &ExecutionState,
        rates: &RatesFile,
        time_entries: &TimeEntriesFile,
        policy: &PolicyConfig,
    ) -> BudgetStatus {
        let agg = Self::aggregate(plan, state, rates, time_entries, None);
        let budget_hours = policy.budget_hours;
        let percent_used = if budget_hours > 0.0 {
            agg.total_hours / budget_hours * 100.0
        } else {
            0.0
        };

        let default_rate = rates.default_rate();
        let (projected_hours, projected_cost) = match default_rate {
            Some(rate) => {
                let hours: f64 = plan.tasks.iter().filter_map(|t| parse_estimate_hours(&t.estimate)).sum();
                (hours, hours * rate.hourly_rate)
            }
            None => (0.0, 0.0),
        };

        BudgetStatus {
            used_hours: agg.total_hours,
            budget_hours,
            percent_used,
            remaining_hours: budget_hours - agg.total_hours,
            over_budget: budget_hours > 0.0 && agg.total_hours > budget_hours,
            projected_hours,
            projected_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Rate, Task, TimeEntry};

    fn rates_with_default(hourly: f64) -> RatesFile {
        RatesFile {
            rates: vec![Rate {
                id: "rate-1".into(),
                name: "Standard".into(),
                hourly_rate: hourly,
                currency: "USD".into(),
                is_default: true,
            }],
        }
    }

    #[test]
    fn dedup_prefers_time_entry_over_elapsed_minutes() {
        let plan = Plan::new("p1", "s1", vec![Task::new("task-1", "T1", "f1")]);
        let mut state = ExecutionState::new("p1");
        let mut result = crate::domain::TaskResult::pending();
        result.elapsed_minutes = 60;
        state.results.insert("task-1".into(), result);

        let rates = rates_with_default(100.0);
        let time_entries = TimeEntriesFile {
            entries: vec![TimeEntry {
                id: "te-1".into(),
                task_id: "task-1".into(),
                rate_id: "rate-1".into(),
                minutes: 60,
                description: String::new(),
                created_at: chrono::Utc::now(),
            }],
        };

        let report = BillingReconciler::cost_report(&plan, &state, &rates, &time_entries, None, None);
        assert_eq!(report.total_hours, 1.0);
        assert_eq!(report.total_cost, 100.0);
    }

    #[test]
    fn stale_rate_identifier_is_skipped() {
        let plan = Plan::new("p1", "s1", vec![]);
        let state = ExecutionState::new("p1");
        let rates = RatesFile::default();
        let time_entries = TimeEntriesFile {
            entries: vec![TimeEntry {
                id: "te-1".into(),
                task_id: "task-1".into(),
                rate_id: "missing-rate".into(),
                minutes: 60,
                description: String::new(),
                created_at: chrono::Utc::now(),
            }],
        };
        let report = BillingReconciler::cost_report(&plan, &state, &rates, &time_entries, None, None);
        assert_eq!(report.total_hours, 0.0);
    }

    #[test]
    fn budget_status_flags_over_budget() {
        let plan = Plan::new("p1", "s1", vec![Task::new("task-1", "T1", "f1")]);
        let mut state = ExecutionState::new("p1");
        let mut result = crate::domain::TaskResult::pending();
        result.elapsed_minutes = 600;
        state.results.insert("task-1".into(), result);

        let rates = rates_with_default(50.0);
        let time_entries = TimeEntriesFile::default();
        let policy = PolicyConfig { budget_hours: 5.0, ..Default::default() };

        let status = BillingReconciler::budget_status(&plan, &state, &rates, &time_entries, &policy);
        assert!(status.over_budget);
        assert_eq!(status.used_hours, 10.0);
    }

    #[test]
    fn parse_estimate_hours_supports_h_d_m_suffixes() {
        assert_eq!(parse_estimate_hours("4h"), Some(4.0));
        assert_eq!(parse_estimate_hours("2d"), Some(16.0));
        assert_eq!(parse_estimate_hours("30m"), Some(0.5));
        assert_eq!(parse_estimate_hours(""), None);
    }
}
