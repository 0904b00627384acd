//! Replayable read-models folded from the event stream. Every projection
//! supports `apply` (incremental) and `rebuild` (reset + replay), and the
//! two must agree per the event-sourcing invariant: replaying a stream from
//! scratch yields the same state as applying each event as it arrived.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::domain::{DebtKind, Severity, TaskStatus, VelocityTrend};
use crate::domain::{BurndownPoint, ForecastResult};
use crate::domain::Event;

pub trait Projection {
    fn apply(&mut self, event: &Event);
    fn reset(&mut self);

    fn rebuild(&mut self, events: &[Event]) {
        self.reset();
        for event in events {
            self.apply(event);
        }
    }
}

fn metadata_str<'a>(event: &'a Event, key: &str) -> Option<&'a str> {
    event.metadata.get(key).and_then(|v| v.as_str())
}

// --- TaskStateProjection ---

#[derive(Debug, Clone, Default)]
pub struct TaskView {
    pub status: Option<TaskStatus>,
    pub owner: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_evidence: Option<String>,
}

#[derive(Debug, Default)]
pub struct TaskStateProjection {
    tasks: HashMap<String, TaskView>,
}

impl TaskStateProjection {
    pub fn get(&self, task_id: &str) -> Option<&TaskView> {
        self.tasks.get(task_id)
    }
}

impl Projection for TaskStateProjection {
    fn apply(&mut self, event: &Event) {
        if event.action != "task.transition" {
            return;
        }
        let Some(task_id) = metadata_str(event, "task_id") else {
            return;
        };
        let view = self.tasks.entry(task_id.to_string()).or_default();
        if let Some(status) = metadata_str(event, "status") {
            view.status = parse_status(status);
        }
        if let Some(owner) = metadata_str(event, "owner") {
            view.owner = Some(owner.to_string());
        }
        if metadata_str(event, "event") == Some("start") {
            view.started_at = Some(event.timestamp);
        }
        if let Some(evidence) = metadata_str(event, "evidence") {
            view.last_evidence = Some(evidence.to_string());
        }
    }

    fn reset(&mut self) {
        self.tasks.clear();
    }
}

fn parse_status(s: &str) -> Option<TaskStatus> {
    match s {
        "pending" => Some(TaskStatus::Pending),
        "in_progress" => Some(TaskStatus::InProgress),
        "blocked" => Some(TaskStatus::Blocked),
        "done" => Some(TaskStatus::Done),
        "verified" => Some(TaskStatus::Verified),
        _ => None,
    }
}

// --- VelocityProjection ---

pub struct VelocityProjection {
    window_days: i64,
    completions: Vec<DateTime<Utc>>,
    verifications: Vec<DateTime<Utc>>,
}

impl VelocityProjection {
    pub fn new(window_days: i64) -> Self {
        Self {
            window_days,
            completions: Vec::new(),
            verifications: Vec::new(),
        }
    }

    fn rate(points: &[DateTime<Utc>], window_days: i64, now: DateTime<Utc>) -> f64 {
        let cutoff = now - Duration::days(window_days);
        let count = points.iter().filter(|t| **t >= cutoff).count();
        count as f64 / window_days.max(1) as f64
    }

    pub fn completions_per_day(&self, now: DateTime<Utc>) -> f64 {
        Self::rate(&self.completions, self.window_days, now)
    }

    pub fn verifications_per_day(&self, now: DateTime<Utc>) -> f64 {
        Self::rate(&self.verifications, self.window_days, now)
    }
}

impl Projection for VelocityProjection {
    fn apply(&mut self, event: &Event) {
        if event.action != "task.transition" {
            return;
        }
        match metadata_str(event, "event") {
            Some("complete") => self.completions.push(event.timestamp),
            Some("verify") => self.verifications.push(event.timestamp),
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.completions.clear();
        self.verifications.clear();
    }
}

// --- ExtendedVelocityProjection ---

pub struct ExtendedVelocityProjection {
    windows: Vec<VelocityProjection>,
    window_days: Vec<i64>,
}

impl ExtendedVelocityProjection {
    pub fn new(window_days: Vec<i64>) -> Self {
        Self {
            windows: window_days.iter().map(|d| VelocityProjection::new(*d)).collect(),
            window_days,
        }
    }

    /// Compares the newest (smallest) window's rate to the mean of the
    /// remaining, older windows.
    pub fn trend(&self, now: DateTime<Utc>) -> VelocityTrend {
        if self.windows.len() < 2 {
            return VelocityTrend::Stable;
        }
        let newest = self.windows[0].completions_per_day(now);
        let older: Vec<f64> = self.windows[1..]
            .iter()
            .map(|w| w.completions_per_day(now))
            .collect();
        let mean_older = older.iter().sum::<f64>() / older.len() as f64;

        if mean_older == 0.0 {
            return if newest > 0.0 {
                VelocityTrend::Accelerating
            } else {
                VelocityTrend::Stable
            };
        }

        let delta = (newest - mean_older) / mean_older;
        if delta > 0.1 {
            VelocityTrend::Accelerating
        } else if delta < -0.1 {
            VelocityTrend::Decelerating
        } else {
            VelocityTrend::Stable
        }
    }

    /// Burndown assuming the shortest window's current completion rate holds
    /// steady for `horizon_days`.
    pub fn burndown(&self, remaining: f64, horizon_days: u32, now: DateTime<Utc>) -> ForecastResult {
        let rate = self.windows.first().map(|w| w.completions_per_day(now)).unwrap_or(0.0);
        let mut points = Vec::with_capacity(horizon_days as usize);
        let mut left = remaining;
        for day in 0..horizon_days {
            points.push(BurndownPoint {
                day_index: day,
                remaining_estimate: left.max(0.0),
            });
            left -= rate;
        }
        ForecastResult {
            trend: self.trend(now),
            burndown: points,
        }
    }

    pub fn window_days(&self) -> &[i64] {
        &self.window_days
    }
}

impl Projection for ExtendedVelocityProjection {
    fn apply(&mut self, event: &Event) {
        for window in &mut self.windows {
            window.apply(event);
        }
    }

    fn reset(&mut self) {
        for window in &mut self.windows {
            window.reset();
        }
    }
}

// --- AuditTimelineProjection ---

#[derive(Default)]
pub struct AuditTimelineProjection {
    timeline: Vec<Event>,
}

impl AuditTimelineProjection {
    pub fn timeline(&self) -> &[Event] {
        &self.timeline
    }

    pub fn recent_n(&self, n: usize) -> &[Event] {
        let len = self.timeline.len();
        &self.timeline[len.saturating_sub(n)..]
    }
}

impl Projection for AuditTimelineProjection {
    fn apply(&mut self, event: &Event) {
        self.timeline.push(event.clone());
    }

    fn reset(&mut self) {
        self.timeline.clear();
    }
}

// --- DriftHistoryProjection ---

#[derive(Debug, Clone)]
pub struct DriftSnapshot {
    pub timestamp: DateTime<Utc>,
    pub category: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default)]
pub struct ComponentDriftHistory {
    pub snapshots: Vec<DriftSnapshot>,
    pub last_resolved_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct DriftHistoryProjection {
    by_component: HashMap<String, ComponentDriftHistory>,
}

impl DriftHistoryProjection {
    pub fn component(&self, component: &str) -> Option<&ComponentDriftHistory> {
        self.by_component.get(component)
    }

    pub fn components(&self) -> impl Iterator<Item = &String> {
        self.by_component.keys()
    }

    /// A component is sticky if its most recent unresolved drift snapshot
    /// is older than seven days.
    pub fn is_sticky(&self, component: &str, now: DateTime<Utc>) -> bool {
        let Some(history) = self.by_component.get(component) else {
            return false;
        };
        let Some(last) = history.snapshots.last() else {
            return false;
        };
        if let Some(resolved_at) = history.last_resolved_at {
            if resolved_at >= last.timestamp {
                return false;
            }
        }
        now - last.timestamp > Duration::days(7)
    }

    pub fn debt_kind_for_category(category: &str) -> DebtKind {
        match category {
            "MISMATCH" | "MISSING" => DebtKind::Neglect,
            "ORPHAN" | "missing-code" | "empty-code" | "uncommitted-code" => DebtKind::Churn,
            _ => DebtKind::Churn,
        }
    }
}

impl Projection for DriftHistoryProjection {
    fn apply(&mut self, event: &Event) {
        let Some(component) = metadata_str(event, "component") else {
            return;
        };
        let entry = self.by_component.entry(component.to_string()).or_default();

        match event.action.as_str() {
            "drift.detected" => {
                let category = metadata_str(event, "category").unwrap_or("UNKNOWN").to_string();
                let severity = match metadata_str(event, "severity") {
                    Some("critical") => Severity::Critical,
                    Some("high") => Severity::High,
                    Some("low") => Severity::Low,
                    _ => Severity::Medium,
                };
                entry.snapshots.push(DriftSnapshot {
                    timestamp: event.timestamp,
                    category,
                    severity,
                });
            }
            "drift.resolved" => {
                entry.last_resolved_at = Some(event.timestamp);
            }
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.by_component.clear();
    }
}
