//! `PolicyConfig`: the tunable knobs the policy evaluator reads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// 0 means unlimited.
    #[serde(default)]
    pub max_wip: u32,
    #[serde(default)]
    pub allow_ai: bool,
    #[serde(default)]
    pub token_limit: u64,
    #[serde(default)]
    pub budget_hours: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_wip: 0,
            allow_ai: true,
            token_limit: 0,
            budget_hours: 0.0,
        }
    }
}

impl PolicyConfig {
    /// Merge two configs for cross-project aggregation: most restrictive
    /// `max_wip` wins (0 = unlimited counts as least restrictive),
    /// `allow_ai` is a logical AND, `budget_hours` sums, `token_limit` sums.
    pub fn merge(&self, other: &PolicyConfig) -> PolicyConfig {
        let max_wip = match (self.max_wip, other.max_wip) {
            (0, b) => b,
            (a, 0) => a,
            (a, b) => a.min(b),
        };
        PolicyConfig {
            max_wip,
            allow_ai: self.allow_ai && other.allow_ai,
            token_limit: self.token_limit + other.token_limit,
            budget_hours: self.budget_hours + other.budget_hours,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_takes_the_tighter_nonzero_wip_limit() {
        let a = PolicyConfig { max_wip: 3, ..Default::default() };
        let b = PolicyConfig { max_wip: 5, ..Default::default() };
        assert_eq!(a.merge(&b).max_wip, 3);
    }

    #[test]
    fn merge_treats_zero_as_unlimited() {
        let a = PolicyConfig { max_wip: 0, ..Default::default() };
        let b = PolicyConfig { max_wip: 5, ..Default::default() };
        assert_eq!(a.merge(&b).max_wip, 5);
    }

    #[test]
    fn merge_ands_allow_ai() {
        let a = PolicyConfig { allow_ai: true, ..Default::default() };
        let b = PolicyConfig { allow_ai: false, ..Default::default() };
        assert!(!a.merge(&b).allow_ai);
    }
}
