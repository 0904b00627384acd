//! The audit `Event`: the hash-chained unit of the append-only log.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::hash::canonical_hash;

/// The subset of an event's fields that feed the hash, in the fixed order
/// the wire format promises. Kept as a private shadow type so `Event`
/// itself can carry `hash` without that field folding into its own digest.
#[derive(Serialize)]
struct EventForHash<'a> {
    id: &'a Uuid,
    timestamp: &'a DateTime<Utc>,
    action: &'a str,
    actor: &'a str,
    metadata: &'a HashMap<String, Value>,
    prev_hash: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Dotted namespace, e.g. `task.transition`, `plan.approved`.
    pub action: String,
    /// Human name, `"cli"`, `"ai"`, `"system"`, or a plugin identifier.
    pub actor: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub prev_hash: String,
    pub hash: String,
}

impl Event {
    /// Builds the next event in a chain whose previous tail hash is
    /// `prev_hash` (`""` for the very first event). Computes and sets `hash`.
    pub fn next(
        action: impl Into<String>,
        actor: impl Into<String>,
        metadata: HashMap<String, Value>,
        prev_hash: impl Into<String>,
    ) -> Self {
        let id = Uuid::now_v7();
        let timestamp = Utc::now();
        let action = action.into();
        let actor = actor.into();
        let prev_hash = prev_hash.into();
        let hash = Self::compute_hash(&id, &timestamp, &action, &actor, &metadata, &prev_hash);
        Self {
            id,
            timestamp,
            action,
            actor,
            metadata,
            prev_hash,
            hash,
        }
    }

    fn compute_hash(
        id: &Uuid,
        timestamp: &DateTime<Utc>,
        action: &str,
        actor: &str,
        metadata: &HashMap<String, Value>,
        prev_hash: &str,
    ) -> String {
        let shadow = EventForHash {
            id,
            timestamp,
            action,
            actor,
            metadata,
            prev_hash,
        };
        canonical_hash(&shadow)
            .expect("event fields always serialize")
            .to_hex()
    }

    /// Recomputes this event's hash from its own fields, ignoring the stored
    /// `hash` value. Used by `verify_integrity` to detect tampering.
    pub fn recompute_hash(&self) -> String {
        Self::compute_hash(
            &self.id,
            &self.timestamp,
            &self.action,
            &self.actor,
            &self.metadata,
            &self.prev_hash,
        )
    }
}
