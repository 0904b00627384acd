//! The drift detector: four orthogonal checks composed into one report,
//! plus `accept_drift`, which locks the current spec as the new baseline.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::domain::drift::Report;
use crate::domain::{DriftIssue, DriftType, ExecutionState, Plan, ProductSpec, Severity};
use crate::external::{CodeInspector, GitStatus};
use crate::policy::Violation;

/// Intent drift: the current spec's content hash differs from the locked
/// spec's. No issue if no locked spec has ever been saved.
pub fn detect_intent_drift(spec: &ProductSpec, locked: Option<&ProductSpec>) -> Vec<DriftIssue> {
    match locked {
        Some(locked) if locked.content_hash() != spec.content_hash() => vec![DriftIssue::new(
            DriftType::Spec,
            "MISMATCH",
            Severity::Medium,
            "current spec no longer matches the locked spec",
        )],
        _ => Vec::new(),
    }
}

/// Plan drift: requirements with no backing task (`MISSING`), tasks with no
/// backing requirement or feature (`ORPHAN`).
pub fn detect_plan_drift(spec: &ProductSpec, plan: &Plan) -> Vec<DriftIssue> {
    let mut issues = Vec::new();
    let known_features: std::collections::HashSet<&str> = spec.feature_ids().into_iter().collect();

    for feature in &spec.features {
        for requirement in &feature.requirements {
            let expected_task = format!("task-{}", requirement.id);
            let has_task = plan
                .tasks
                .iter()
                .any(|t| t.id == expected_task || t.feature_id == feature.id);
            if !has_task {
                issues.push(
                    DriftIssue::new(
                        DriftType::Plan,
                        "MISSING",
                        Severity::High,
                        format!("requirement {} has no backing task", requirement.id),
                    )
                    .with_task(expected_task),
                );
            }
        }
    }

    for task in &plan.tasks {
        let requirement_id = task.id.strip_prefix("task-");
        let known_requirement = requirement_id
            .map(|r| spec.requirement_ids().contains(&r))
            .unwrap_or(false);
        if !known_requirement && !known_features.contains(task.feature_id.as_str()) {
            issues.push(
                DriftIssue::new(
                    DriftType::Plan,
                    "ORPHAN",
                    Severity::Medium,
                    format!("task {} has no backing requirement or feature", task.id),
                )
                .with_task(task.id.clone()),
            );
        }
    }

    issues
}

/// Code drift: done tasks whose recorded filesystem path is missing,
/// empty, or not committed.
pub fn detect_code_drift(plan: &Plan, state: &ExecutionState, inspector: &dyn CodeInspector) -> Vec<DriftIssue> {
    let mut issues = Vec::new();
    for task in &plan.tasks {
        let Some(result) = state.results.get(&task.id) else {
            continue;
        };
        if result.status != crate::domain::TaskStatus::Done {
            continue;
        }
        let Some(path) = result.path.as_deref() else {
            continue;
        };

        if !inspector.file_exists(path) {
            issues.push(
                DriftIssue::new(DriftType::Code, "missing-code", Severity::Critical, format!("{path} is missing"))
                    .with_task(task.id.clone()),
            );
            continue;
        }
        if !inspector.file_not_empty(path) {
            issues.push(
                DriftIssue::new(DriftType::Code, "empty-code", Severity::High, format!("{path} is empty"))
                    .with_task(task.id.clone()),
            );
            continue;
        }
        match inspector.git_status(path) {
            GitStatus::Modified | GitStatus::Untracked => {
                issues.push(
                    DriftIssue::new(
                        DriftType::Code,
                        "uncommitted-code",
                        Severity::Medium,
                        format!("{path} has uncommitted changes"),
                    )
                    .with_task(task.id.clone()),
                );
            }
            _ => {}
        }
    }
    issues
}

/// Policy drift: every violation becomes an issue; `warning -> medium`,
/// `error -> high`.
pub fn detect_policy_drift(violations: &[Violation]) -> Vec<DriftIssue> {
    violations
        .iter()
        .map(|v| {
            let severity = match v.level {
                crate::policy::Level::Warning => Severity::Medium,
                crate::policy::Level::Error => Severity::High,
            };
            let mut issue = DriftIssue::new(DriftType::Policy, v.rule_id.clone(), severity, v.message.clone());
            if let Some(task_id) = &v.task_id {
                issue = issue.with_task(task_id.clone());
            }
            issue
        })
        .collect()
}

pub struct DriftDetector;

impl DriftDetector {
    #[allow(clippy::too_many_arguments)]
    pub fn detect(
        spec: &ProductSpec,
        locked: Option<&ProductSpec>,
        plan: &Plan,
        state: &ExecutionState,
        inspector: &dyn CodeInspector,
        policy_violations: &[Violation],
    ) -> Report {
        let mut issues = Vec::new();
        issues.extend(detect_intent_drift(spec, locked));
        issues.extend(detect_plan_drift(spec, plan));
        issues.extend(detect_code_drift(plan, state, inspector));
        issues.extend(detect_policy_drift(policy_violations));
        Report::new(issues)
    }

    /// Copies `spec` into the new locked baseline and returns it along with
    /// the `drift.accepted` event metadata; the caller persists the locked
    /// spec and appends the event.
    pub fn accept_drift(spec: &ProductSpec) -> (ProductSpec, HashMap<String, Value>) {
        let mut metadata = HashMap::new();
        metadata.insert("spec_id".to_string(), json!(spec.id));
        metadata.insert("spec_hash".to_string(), json!(spec.content_hash().to_hex()));
        (spec.clone(), metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Feature, Priority, Requirement, Task};
    use crate::external::stub::StubCodeInspector;

    fn spec_with_one_requirement(title: &str) -> ProductSpec {
        ProductSpec {
            id: "s1".into(),
            title: title.into(),
            description: String::new(),
            version: "0.1.0".into(),
            features: vec![Feature {
                id: "f1".into(),
                title: "F1".into(),
                description: String::new(),
                requirements: vec![Requirement {
                    id: "r1".into(),
                    title: "R1".into(),
                    description: String::new(),
                    priority: Priority::Medium,
                    estimate: "4h".into(),
                    depends_on: vec![],
                }],
            }],
            constraints: vec![],
        }
    }

    #[test]
    fn intent_drift_flags_hash_mismatch() {
        let spec = spec_with_one_requirement("S2");
        let locked = spec_with_one_requirement("S1");
        let issues = detect_intent_drift(&spec, Some(&locked));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, "MISMATCH");
    }

    #[test]
    fn intent_drift_clean_when_no_locked_spec() {
        let spec = spec_with_one_requirement("S1");
        assert!(detect_intent_drift(&spec, None).is_empty());
    }

    #[test]
    fn plan_drift_flags_missing_and_orphan() {
        let spec = spec_with_one_requirement("S1");
        let plan = Plan::new("p1", "s1", vec![Task::new("orphan-task", "Orphan", "unknown-feature")]);
        let issues = detect_plan_drift(&spec, &plan);
        assert!(issues.iter().any(|i| i.category == "MISSING"));
        assert!(issues.iter().any(|i| i.category == "ORPHAN"));
    }

    #[test]
    fn code_drift_flags_missing_file_for_done_task() {
        let mut task = Task::new("task-r1", "R1", "f1");
        task.id = "task-r1".into();
        let plan = Plan::new("p1", "s1", vec![task]);

        let mut state = ExecutionState::new("p1");
        let mut result = crate::domain::TaskResult::pending();
        result.status = crate::domain::TaskStatus::Done;
        result.path = Some("src/missing.rs".into());
        state.results.insert("task-r1".into(), result);

        let inspector = StubCodeInspector::default();
        let issues = detect_code_drift(&plan, &state, &inspector);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category, "missing-code");
    }

    #[test]
    fn accept_drift_copies_spec_and_builds_metadata() {
        let spec = spec_with_one_requirement("S1");
        let (locked, metadata) = DriftDetector::accept_drift(&spec);
        assert_eq!(locked.content_hash(), spec.content_hash());
        assert_eq!(metadata["spec_id"], json!("s1"));
    }
}
