//! The standard policy rule set: work-in-progress limits and dependency
//! completion. Implemented as trait objects rather than a class hierarchy,
//! per the "capability record" style used for the other external
//! collaborator contracts.

use crate::domain::{ExecutionState, Plan, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Violation {
    pub rule_id: String,
    pub level: Level,
    pub message: String,
    pub task_id: Option<String>,
}

pub trait PolicyRule: Send + Sync {
    fn id(&self) -> &str;
    fn validate(&self, plan: &Plan, state: &ExecutionState) -> Vec<Violation>;
}

/// Counts tasks with `status = in_progress`; emits one warning per task
/// beyond `limit` (0 = unlimited).
pub struct WipRule {
    pub limit: u32,
}

impl PolicyRule for WipRule {
    fn id(&self) -> &str {
        "wip"
    }

    fn validate(&self, plan: &Plan, state: &ExecutionState) -> Vec<Violation> {
        if self.limit == 0 {
            return Vec::new();
        }
        let in_progress: Vec<&str> = plan
            .tasks
            .iter()
            .map(|t| t.id.as_str())
            .filter(|id| {
                state
                    .results
                    .get(*id)
                    .map(|r| r.status == TaskStatus::InProgress)
                    .unwrap_or(false)
            })
            .collect();

        if in_progress.len() as u32 <= self.limit {
            return Vec::new();
        }

        in_progress
            .iter()
            .skip(self.limit as usize)
            .map(|task_id| Violation {
                rule_id: self.id().to_string(),
                level: Level::Warning,
                message: format!("WIP limit reached (current limit: {})", self.limit),
                task_id: Some(task_id.to_string()),
            })
            .collect()
    }
}

/// For each in-progress or done task, every *local* dependency must be
/// done-or-verified; cross-repo dependencies are checked only by the
/// per-transition `start` guard, not by this standing rule.
pub struct DependencyRule;

impl PolicyRule for DependencyRule {
    fn id(&self) -> &str {
        "dependency"
    }

    fn validate(&self, plan: &Plan, state: &ExecutionState) -> Vec<Violation> {
        let mut violations = Vec::new();
        for task in &plan.tasks {
            let status = state.results.get(&task.id).map(|r| r.status);
            if !matches!(status, Some(TaskStatus::InProgress) | Some(TaskStatus::Done)) {
                continue;
            }
            for dep in &task.depends_on {
                if dep.contains(':') {
                    continue;
                }
                if !state.dependency_satisfied(dep) {
                    violations.push(Violation {
                        rule_id: self.id().to_string(),
                        level: Level::Error,
                        message: format!("task {} depends on incomplete task {}", task.id, dep),
                        task_id: Some(task.id.clone()),
                    });
                }
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ApprovalStatus, Task, TaskResult};

    fn plan_with(tasks: Vec<Task>) -> Plan {
        Plan {
            id: "p1".into(),
            spec_id: "s1".into(),
            approval_status: ApprovalStatus::Approved,
            tasks,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn wip_rule_emits_one_violation_per_task_beyond_limit() {
        let t1 = Task::new("task-r1", "R1", "f1");
        let t2 = Task::new("task-r2", "R2", "f1");
        let plan = plan_with(vec![t1, t2]);

        let mut state = ExecutionState::new("p1");
        let mut r1 = TaskResult::pending();
        r1.status = TaskStatus::InProgress;
        let mut r2 = TaskResult::pending();
        r2.status = TaskStatus::InProgress;
        state.results.insert("task-r1".into(), r1);
        state.results.insert("task-r2".into(), r2);

        let rule = WipRule { limit: 1 };
        let violations = rule.validate(&plan, &state);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].task_id.as_deref(), Some("task-r2"));
    }

    #[test]
    fn dependency_rule_flags_in_progress_task_with_incomplete_dependency() {
        let mut t2 = Task::new("task-r2", "R2", "f1");
        t2.depends_on = vec!["task-r1".into()];
        let plan = plan_with(vec![Task::new("task-r1", "R1", "f1"), t2]);

        let mut state = ExecutionState::new("p1");
        let mut r2 = TaskResult::pending();
        r2.status = TaskStatus::InProgress;
        state.results.insert("task-r2".into(), r2);

        let rule = DependencyRule;
        let violations = rule.validate(&plan, &state);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].level, Level::Error);
    }

    #[test]
    fn dependency_rule_skips_cross_repo_dependencies() {
        let mut t1 = Task::new("task-r1", "R1", "f1");
        t1.depends_on = vec!["other-project:task-r9".into()];
        let plan = plan_with(vec![t1]);

        let mut state = ExecutionState::new("p1");
        let mut r1 = TaskResult::pending();
        r1.status = TaskStatus::InProgress;
        state.results.insert("task-r1".into(), r1);

        let rule = DependencyRule;
        assert!(rule.validate(&plan, &state).is_empty());
    }
}
