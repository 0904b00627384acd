//! The policy evaluator: an ordered rule set producing violations, plus the
//! per-transition `validate_transition` gate used by the task coordinator.

pub mod cross_repo;
pub mod rules;

use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::domain::{ExecutionState, Plan, PolicyConfig, TaskStatus};
use crate::errors::RoadyError;
pub use rules::{DependencyRule, Level, PolicyRule, Violation, WipRule};

pub struct PolicyEvaluator {
    rules: Vec<Box<dyn PolicyRule>>,
}

impl PolicyEvaluator {
    pub fn standard(policy: &PolicyConfig) -> Self {
        Self {
            rules: vec![
                Box::new(WipRule { limit: policy.max_wip }),
                Box::new(DependencyRule),
            ],
        }
    }

    pub fn evaluate(&self, plan: &Plan, state: &ExecutionState) -> Vec<Violation> {
        self.rules.iter().flat_map(|r| r.validate(plan, state)).collect()
    }

    /// Per-transition gate. Only `start` has guard logic beyond the state
    /// machine itself; every other event returns `Ok(())` unconditionally
    /// because the state machine is the authority for those.
    pub fn validate_transition(
        &self,
        task_id: &str,
        event: &str,
        plan: &Plan,
        state: &ExecutionState,
        policy: &PolicyConfig,
        project_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), RoadyError> {
        if event != "start" {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(RoadyError::Cancelled);
        }

        let task = plan
            .task(task_id)
            .ok_or_else(|| RoadyError::UnknownTask(task_id.to_string()))?;

        if policy.max_wip > 0 {
            let wip_excluding_candidate = plan
                .tasks
                .iter()
                .filter(|t| t.id != task_id)
                .filter(|t| {
                    state
                        .results
                        .get(&t.id)
                        .map(|r| r.status == TaskStatus::InProgress)
                        .unwrap_or(false)
                })
                .count() as u32;
            if wip_excluding_candidate >= policy.max_wip {
                return Err(RoadyError::WipLimitReached { limit: policy.max_wip });
            }
        }

        for dep in &task.depends_on {
            if cancel.is_cancelled() {
                return Err(RoadyError::Cancelled);
            }
            if let Some((project_name, remote_task_id)) =
                crate::domain::Task::cross_repo_dependency(dep)
            {
                let discovered = cross_repo::resolve_project(project_root, project_name, cancel)?
                    .ok_or_else(|| RoadyError::ExternalProjectNotFound(project_name.to_string()))?;
                let remote_state = discovered.repository.load_state(project_name)?;
                if !remote_state.dependency_satisfied(remote_task_id) {
                    return Err(RoadyError::UnmetDependency(dep.clone()));
                }
            } else if !state.dependency_satisfied(dep) {
                return Err(RoadyError::UnmetDependency(dep.clone()));
            }
        }

        Ok(())
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
    fn start_fails_when_wip_excluding_candidate_meets_limit() {
        let t1 = Task::new("task-r1", "R1", "f1");
        let t2 = Task::new("task-r2", "R2", "f1");
        let plan = plan_with(vec![t1, t2]);

        let mut state = ExecutionState::new("p1");
        let mut r1 = TaskResult::pending();
        r1.status = TaskStatus::InProgress;
        state.results.insert("task-r1".into(), r1);

        let policy = PolicyConfig { max_wip: 1, ..Default::default() };
        let evaluator = PolicyEvaluator::standard(&policy);
        let cancel = CancellationToken::new();
        let err = evaluator
            .validate_transition("task-r2", "start", &plan, &state, &policy, Path::new("."), &cancel)
            .unwrap_err();
        assert!(matches!(err, RoadyError::WipLimitReached { limit: 1 }));
    }

    #[test]
    fn start_fails_on_unmet_local_dependency() {
        let mut t2 = Task::new("task-r2", "R2", "f1");
        t2.depends_on = vec!["task-r1".into()];
        let plan = plan_with(vec![Task::new("task-r1", "R1", "f1"), t2]);
        let state = ExecutionState::new("p1");
        let policy = PolicyConfig::default();
        let evaluator = PolicyEvaluator::standard(&policy);
        let cancel = CancellationToken::new();
        let err = evaluator
            .validate_transition("task-r2", "start", &plan, &state, &policy, Path::new("."), &cancel)
            .unwrap_err();
        assert!(matches!(err, RoadyError::UnmetDependency(_)));
    }

    #[test]
    fn non_start_events_are_not_gated() {
        let plan = plan_with(vec![Task::new("task-r1", "R1", "f1")]);
        let state = ExecutionState::new("p1");
        let policy = PolicyConfig::default();
        let evaluator = PolicyEvaluator::standard(&policy);
        let cancel = CancellationToken::new();
        assert!(evaluator
            .validate_transition("task-r1", "complete", &plan, &state, &policy, Path::new("."), &cancel)
            .is_ok());
    }
}
