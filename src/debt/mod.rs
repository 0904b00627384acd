//! Debt and forecast analytics: derived purely from the drift-history and
//! extended-velocity projections, with no independent persistence.

use chrono::{DateTime, Utc};

use crate::domain::{DebtItem, DebtScore, ForecastResult};
use crate::events::projections::{DriftHistoryProjection, ExtendedVelocityProjection};

fn severity_weight(severity: crate::domain::Severity) -> u32 {
    match severity {
        crate::domain::Severity::Critical => 4,
        crate::domain::Severity::High => 3,
        crate::domain::Severity::Medium => 2,
        crate::domain::Severity::Low => 1,
    }
}

/// A component contributes a `DebtItem` when it is currently sticky and has
/// at least two recorded snapshots, using the two most recent as the
/// bracketing `first_seen`/`last_seen` pair.
pub fn debt_items(history: &DriftHistoryProjection, now: DateTime<Utc>) -> Vec<DebtItem> {
    history
        .components()
        .filter_map(|component| {
            let entry = history.component(component)?;
            if entry.snapshots.len() < 2 || !history.is_sticky(component, now) {
                return None;
            }
            let last = entry.snapshots.last()?;
            let prior = &entry.snapshots[entry.snapshots.len() - 2];
            Some(DebtItem {
                component: component.clone(),
                kind: DriftHistoryProjection::debt_kind_for_category(&last.category),
                severity: last.severity,
                first_seen: prior.timestamp,
                last_seen: last.timestamp,
                sticky: true,
            })
        })
        .collect()
}

/// Aggregates per-component sticky-item counts weighted by severity.
pub fn debt_score(items: &[DebtItem]) -> DebtScore {
    let mut score = DebtScore::default();
    for item in items {
        let weight = severity_weight(item.severity);
        score.total += weight;
        *score.by_component.entry(item.component.clone()).or_insert(0) += weight;
    }
    score
}

/// Projects a remaining-estimate burndown from the velocity projection's
/// current short-term rate.
pub fn forecast(
    velocity: &ExtendedVelocityProjection,
    remaining: f64,
    horizon_days: u32,
    now: DateTime<Utc>,
) -> ForecastResult {
    velocity.burndown(remaining, horizon_days, now)
}
