//! The human intent: `ProductSpec`, its `Feature`/`Requirement` tree, and the
//! `LockedSpec` snapshot used as the intent-drift baseline.

use serde::{Deserialize, Serialize};

use crate::hash::{canonical_hash, ContentHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub priority: Priority,
    /// Human duration string, e.g. `"4h"`.
    #[serde(default)]
    pub estimate: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSpec {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

impl ProductSpec {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            version: default_version(),
            features: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Deterministic content hash: stable key order, no timestamps anywhere
    /// in this type, so equal specs hash equal regardless of how they were
    /// constructed.
    pub fn content_hash(&self) -> ContentHash {
        canonical_hash(self).expect("ProductSpec always serializes")
    }

    pub fn requirement_ids(&self) -> Vec<&str> {
        self.features
            .iter()
            .flat_map(|f| f.requirements.iter().map(|r| r.id.as_str()))
            .collect()
    }

    pub fn feature_ids(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.id.as_str()).collect()
    }

    /// The feature owning a given requirement identifier, if any.
    pub fn feature_for_requirement(&self, requirement_id: &str) -> Option<&Feature> {
        self.features
            .iter()
            .find(|f| f.requirements.iter().any(|r| r.id == requirement_id))
    }
}

/// A snapshot of a [`ProductSpec`] captured at plan-generation or
/// explicit-accept time; the reference point for intent-drift detection.
pub type LockedSpec = ProductSpec;
