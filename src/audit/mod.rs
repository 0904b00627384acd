//! The audit service: a thin wrapper over the event store adding
//! publish-on-append, velocity, and AI telemetry views.

use std::collections::HashMap;

use chrono::Utc;

use crate::domain::Event;
use crate::errors::RoadyError;
use crate::events::{EventStore, Publisher};
use crate::workspace::WorkspaceRepository;

const AI_ACTIONS: &[&str] = &[
    "plan.ai_decomposition",
    "spec.reconcile",
    "spec.ai_explanation",
    "drift.ai_explanation",
];

#[derive(Debug, Clone, Default)]
pub struct AiTelemetry {
    pub total_calls: u64,
    pub retries: u64,
    /// model name -> (input_tokens, output_tokens).
    pub tokens_by_model: HashMap<String, (u64, u64)>,
}

pub struct AuditService<'a> {
    repository: &'a WorkspaceRepository,
    publisher: Publisher,
}

impl<'a> AuditService<'a> {
    pub fn new(repository: &'a WorkspaceRepository) -> Self {
        Self {
            repository,
            publisher: Publisher::new(),
        }
    }

    pub fn subscribe(
        &mut self,
        handler: Box<dyn Fn(&Event) -> Result<(), RoadyError> + Send + Sync>,
    ) {
        self.publisher.subscribe(handler);
    }

    /// Appends the event then publishes it to subscribers. Publisher
    /// handler failures are logged by the publisher itself and never
    /// surfaced here.
    pub fn log(
        &self,
        action: impl Into<String>,
        actor: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Event, RoadyError> {
        let store = EventStore::new(self.repository);
        let event = store.log(action, actor, metadata)?;
        self.publisher.publish(&event);
        Ok(event)
    }

    pub fn verify_integrity(&self) -> Result<Vec<String>, RoadyError> {
        EventStore::new(self.repository).verify_integrity()
    }

    /// Average verified-tasks-per-day since the first `verify` transition
    /// event, floored to one day to avoid dividing by a near-zero span.
    pub fn get_velocity(&self) -> Result<f64, RoadyError> {
        let events = EventStore::new(self.repository).load_all()?;
        let verify_events: Vec<&Event> = events
            .iter()
            .filter(|e| {
                e.action == "task.transition"
                    && e.metadata.get("event").and_then(|v| v.as_str()) == Some("verify")
            })
            .collect();

        let Some(first) = verify_events.first() else {
            return Ok(0.0);
        };

        let days = (Utc::now() - first.timestamp).num_days().max(1) as f64;
        Ok(verify_events.len() as f64 / days)
    }

    /// Folds over `actor = "ai"` events for the recognized action set, plus
    /// a separate `plan.ai_decomposition_retry` counter; token counts are
    /// summed per model from event metadata.
    pub fn get_ai_telemetry(&self) -> Result<AiTelemetry, RoadyError> {
        let events = EventStore::new(self.repository).load_all()?;
        let mut telemetry = AiTelemetry::default();

        for event in &events {
            if event.actor != "ai" {
                continue;
            }
            if event.action == "plan.ai_decomposition_retry" {
                telemetry.retries += 1;
                continue;
            }
            if !AI_ACTIONS.contains(&event.action.as_str()) {
                continue;
            }
            telemetry.total_calls += 1;
            if let Some(model) = event.metadata.get("model").and_then(|v| v.as_str()) {
                let input = event.metadata.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
                let output = event.metadata.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
                let entry = telemetry.tokens_by_model.entry(model.to_string()).or_insert((0, 0));
                entry.0 += input;
                entry.1 += output;
            }
        }

        Ok(telemetry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repo() -> (tempfile::TempDir, WorkspaceRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = WorkspaceRepository::new(dir.path());
        repo.initialize().unwrap();
        (dir, repo)
    }

    #[test]
    fn no_ai_events_yields_zero_total_calls() {
        let (_dir, repo) = repo();
        let audit = AuditService::new(&repo);
        audit.log("plan.generate", "cli", HashMap::new()).unwrap();
        assert_eq!(audit.get_ai_telemetry().unwrap().total_calls, 0);
    }

    #[test]
    fn ai_events_sum_tokens_per_model() {
        let (_dir, repo) = repo();
        let audit = AuditService::new(&repo);
        let mut metadata = HashMap::new();
        metadata.insert("model".to_string(), json!("claude"));
        metadata.insert("input_tokens".to_string(), json!(100));
        metadata.insert("output_tokens".to_string(), json!(50));
        audit.log("plan.ai_decomposition", "ai", metadata).unwrap();

        let telemetry = audit.get_ai_telemetry().unwrap();
        assert_eq!(telemetry.total_calls, 1);
        assert_eq!(telemetry.tokens_by_model["claude"], (100, 50));
    }

    #[test]
    fn velocity_is_zero_with_no_verify_events() {
        let (_dir, repo) = repo();
        let audit = AuditService::new(&repo);
        assert_eq!(audit.get_velocity().unwrap(), 0.0);
    }
}
