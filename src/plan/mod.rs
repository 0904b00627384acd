//! The plan reconciler: merges a freshly proposed task list into an
//! existing plan, preserving execution-adjacent metadata and rejecting
//! cyclic dependency graphs.

use std::collections::{HashMap, HashSet};

use chrono::Utc;

use crate::domain::{ApprovalStatus, Plan, ProductSpec, Task};
use crate::errors::RoadyError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Depth-first search with a three-color marking scheme; a back-edge (an
/// edge into a `Gray` node) means a cycle.
fn detect_cycle(tasks: &[Task]) -> Result<(), RoadyError> {
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut color: HashMap<&str, Color> = tasks.iter().map(|t| (t.id.as_str(), Color::White)).collect();

    fn visit<'a>(
        id: &'a str,
        by_id: &HashMap<&'a str, &'a Task>,
        color: &mut HashMap<&'a str, Color>,
    ) -> Result<(), RoadyError> {
        color.insert(id, Color::Gray);
        if let Some(task) = by_id.get(id) {
            for dep in &task.depends_on {
                if dep.contains(':') {
                    continue; // cross-repo dependencies are outside this graph
                }
                match color.get(dep.as_str()) {
                    Some(Color::Gray) => return Err(RoadyError::CycleDetected(dep.clone())),
                    Some(Color::White) => visit(dep, by_id, color)?,
                    _ => {}
                }
            }
        }
        color.insert(id, Color::Black);
        Ok(())
    }

    let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    for id in ids {
        if color.get(id) == Some(&Color::White) {
            visit(id, &by_id, &mut color)?;
        }
    }
    Ok(())
}

/// Produces a new plan with a fresh identifier from `existing_plan`
/// (if any) and `proposed_tasks`.
///
/// 1. Validates the proposed set's dependency graph.
/// 2. For each proposed task, preserves `created_at` (and any field the
///    proposed record left empty) from an existing task with the same id.
/// 3. Preserves proposed-task order.
/// 4. Never touches `ExecutionState`; pruning is a separate explicit step.
pub fn reconcile(
    existing_plan: Option<&Plan>,
    proposed_tasks: Vec<Task>,
    spec_id: &str,
    new_plan_id: impl Into<String>,
) -> Result<Plan, RoadyError> {
    detect_cycle(&proposed_tasks)?;

    let existing_by_id: HashMap<&str, &Task> = existing_plan
        .map(|p| p.tasks.iter().map(|t| (t.id.as_str(), t)).collect())
        .unwrap_or_default();

    let tasks = proposed_tasks
        .into_iter()
        .map(|mut task| {
            if let Some(existing) = existing_by_id.get(task.id.as_str()) {
                task.created_at = existing.created_at;
                if task.description.is_empty() {
                    task.description = existing.description.clone();
                }
                if task.estimate.is_empty() {
                    task.estimate = existing.estimate.clone();
                }
            }
            task
        })
        .collect();

    Ok(Plan {
        id: new_plan_id.into(),
        spec_id: spec_id.to_string(),
        approval_status: ApprovalStatus::Pending,
        tasks,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    })
}

/// Keeps a task iff its identifier is in `valid_task_ids` or its feature
/// identifier is in `valid_feature_ids`.
pub fn filter_valid_tasks(
    tasks: Vec<Task>,
    valid_task_ids: &HashSet<String>,
    valid_feature_ids: &HashSet<String>,
) -> Vec<Task> {
    tasks
        .into_iter()
        .filter(|t| valid_task_ids.contains(&t.id) || valid_feature_ids.contains(&t.feature_id))
        .collect()
}

/// Derives the default proposed task list from a spec: one task per
/// requirement, `task-<requirement-id>`.
pub fn derive_tasks_from_spec(spec: &ProductSpec) -> Vec<Task> {
    spec.features
        .iter()
        .flat_map(|feature| {
            feature.requirements.iter().map(move |req| {
                let mut task = Task::new(format!("task-{}", req.id), req.title.clone(), feature.id.clone());
                task.description = req.description.clone();
                task.priority = req.priority;
                task.estimate = req.estimate.clone();
                task.depends_on = req.depends_on.iter().map(|d| format!("task-{d}")).collect();
                task
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::spec::{Feature, Priority, Requirement};

    fn spec_with_two_requirements() -> ProductSpec {
        ProductSpec {
            id: "s1".into(),
            title: "S".into(),
            description: String::new(),
            version: "0.1.0".into(),
            features: vec![Feature {
                id: "f1".into(),
                title: "F1".into(),
                description: String::new(),
                requirements: vec![
                    Requirement {
                        id: "r1".into(),
                        title: "R1".into(),
                        description: String::new(),
                        priority: Priority::Medium,
                        estimate: "4h".into(),
                        depends_on: vec![],
                    },
                    Requirement {
                        id: "r2".into(),
                        title: "R2".into(),
                        description: String::new(),
                        priority: Priority::Medium,
                        estimate: "2h".into(),
                        depends_on: vec![],
                    },
                ],
            }],
            constraints: vec![],
        }
    }

    #[test]
    fn derive_and_reconcile_produces_pending_plan_with_two_tasks() {
        let spec = spec_with_two_requirements();
        let tasks = derive_tasks_from_spec(&spec);
        let plan = reconcile(None, tasks, &spec.id, "p1").unwrap();
        assert_eq!(plan.approval_status, ApprovalStatus::Pending);
        assert_eq!(plan.task_ids(), vec!["task-r1", "task-r2"]);
    }

    #[test]
    fn reconcile_preserves_created_at_for_shared_task_ids() {
        let t1 = Task::new("task-r1", "Old title kept via description merge", "f1");
        let old_created = t1.created_at;
        let existing = Plan::new("p0", "s1", vec![t1]);

        let mut proposed = Task::new("task-r1", "R1", "f1");
        proposed.description = String::new();
        let plan = reconcile(Some(&existing), vec![proposed], "s1", "p1").unwrap();

        assert_eq!(plan.tasks[0].created_at, old_created);
    }

    #[test]
    fn reconcile_rejects_cycles() {
        let mut a = Task::new("a", "A", "f1");
        a.depends_on = vec!["b".into()];
        let mut b = Task::new("b", "B", "f1");
        b.depends_on = vec!["a".into()];

        let err = reconcile(None, vec![a, b], "s1", "p1").unwrap_err();
        assert!(matches!(err, RoadyError::CycleDetected(_)));
    }

    #[test]
    fn filter_valid_tasks_keeps_by_id_or_feature() {
        let tasks = vec![
            Task::new("task-r1", "R1", "f1"),
            Task::new("ai-task-xyz", "AI task", "f2"),
            Task::new("orphan", "Orphan", "f3"),
        ];
        let valid_ids: HashSet<String> = ["task-r1"].into_iter().map(String::from).collect();
        let valid_features: HashSet<String> = ["f2"].into_iter().map(String::from).collect();

        let kept = filter_valid_tasks(tasks, &valid_ids, &valid_features);
        assert_eq!(kept.len(), 2);
    }
}
