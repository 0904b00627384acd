//! Workspace bookkeeping types that are not part of the core domain model
//! but still live in the `.roady/` directory: usage stats, plugin configs,
//! team roster, and the organisation-root member list.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    #[serde(default)]
    pub ai_calls: u64,
    #[serde(default)]
    pub ai_input_tokens: u64,
    #[serde(default)]
    pub ai_output_tokens: u64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    pub binary_path: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfigs {
    #[serde(flatten)]
    pub entries: HashMap<String, PluginConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Team {
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatesFile {
    #[serde(default)]
    pub rates: Vec<crate::domain::Rate>,
}

impl RatesFile {
    pub fn default_rate(&self) -> Option<&crate::domain::Rate> {
        self.rates.iter().find(|r| r.is_default)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeEntriesFile {
    #[serde(default)]
    pub entries: Vec<crate::domain::TimeEntry>,
}

/// Exists only at an organisation root, alongside (not inside) member
/// projects' `.roady/` directories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgConfig {
    pub members: Vec<String>,
}
