//! The task coordinator: the lifecycle state machine, its per-transition
//! guards, and the side effects (state mutation, unlocking, event metadata)
//! each transition produces. Persistence and audit logging are the caller's
//! responsibility — this module is pure with respect to the filesystem.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::domain::{ApprovalStatus, ExecutionState, Plan, PolicyConfig, TaskResult, TaskStatus};
use crate::errors::RoadyError;
use crate::policy::PolicyEvaluator;

/// The result of a successful transition: the updated state, the metadata
/// to attach to the `task.transition` event, and (on `complete`) the set of
/// task identifiers newly unlocked by it.
#[derive(Debug)]
pub struct TransitionOutcome {
    pub state: ExecutionState,
    pub event_metadata: HashMap<String, Value>,
    pub unlocked: Vec<String>,
}

fn local_deps_satisfied(task_id: &str, plan: &Plan, state: &ExecutionState) -> bool {
    let Some(task) = plan.task(task_id) else {
        return false;
    };
    task.depends_on
        .iter()
        .filter(|d| !d.contains(':'))
        .all(|d| state.dependency_satisfied(d))
}

/// Tasks in `plan` whose local dependencies are satisfied in `after` but
/// were not satisfied in `before`.
fn newly_unlocked(plan: &Plan, before: &ExecutionState, after: &ExecutionState) -> Vec<String> {
    plan.tasks
        .iter()
        .filter(|t| !local_deps_satisfied(&t.id, plan, before) && local_deps_satisfied(&t.id, plan, after))
        .map(|t| t.id.clone())
        .collect()
}

fn require_status(
    state: &ExecutionState,
    task_id: &str,
    event: &str,
    expected: &[TaskStatus],
) -> Result<TaskStatus, RoadyError> {
    let current = state.result_or_default(task_id).status;
    if !expected.contains(&current) {
        return Err(RoadyError::InvalidTransition {
            task_id: task_id.to_string(),
            event: event.to_string(),
            from: current.to_string(),
        });
    }
    Ok(current)
}

fn base_metadata(task_id: &str, event: &str, status: TaskStatus) -> HashMap<String, Value> {
    let mut metadata = HashMap::new();
    metadata.insert("task_id".to_string(), json!(task_id));
    metadata.insert("event".to_string(), json!(event));
    metadata.insert("status".to_string(), json!(status.as_str()));
    metadata
}

pub struct TaskCoordinator;

impl TaskCoordinator {
    /// `pending -> in_progress`. Requires an approved plan and passes
    /// `PolicyEvaluator::validate_transition`.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        task_id: &str,
        owner: &str,
        plan: &Plan,
        state: &ExecutionState,
        policy: &PolicyConfig,
        evaluator: &PolicyEvaluator,
        project_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<TransitionOutcome, RoadyError> {
        if cancel.is_cancelled() {
            return Err(RoadyError::Cancelled);
        }
        if plan.approval_status != ApprovalStatus::Approved {
            return Err(RoadyError::PlanNotApproved);
        }
        plan.task(task_id)
            .ok_or_else(|| RoadyError::TaskNotInPlan(task_id.to_string()))?;
        require_status(state, task_id, "start", &[TaskStatus::Pending])?;
        evaluator.validate_transition(task_id, "start", plan, state, policy, project_root, cancel)?;

        let mut next = state.clone();
        let mut result = next.result_or_default(task_id);
        result.status = TaskStatus::InProgress;
        result.owner = Some(owner.to_string());
        result.started_at = Some(Utc::now());
        next.results.insert(task_id.to_string(), result);
        next.updated_at = Utc::now();

        let mut metadata = base_metadata(task_id, "start", TaskStatus::InProgress);
        metadata.insert("owner".to_string(), json!(owner));

        Ok(TransitionOutcome {
            state: next,
            event_metadata: metadata,
            unlocked: Vec::new(),
        })
    }

    /// `in_progress -> done`. Accumulates elapsed minutes from `started_at`
    /// and computes the set of tasks newly unlocked by this completion.
    pub fn complete(
        task_id: &str,
        evidence: Option<&str>,
        plan: &Plan,
        state: &ExecutionState,
    ) -> Result<TransitionOutcome, RoadyError> {
        require_status(state, task_id, "complete", &[TaskStatus::InProgress])?;

        let mut next = state.clone();
        let mut result = next.result_or_default(task_id);
        result.elapsed_minutes += elapsed_since(result.started_at);
        result.status = TaskStatus::Done;
        if let Some(ev) = evidence {
            result.evidence.push(ev.to_string());
        }
        next.results.insert(task_id.to_string(), result.clone());
        next.updated_at = Utc::now();

        let unlocked = newly_unlocked(plan, state, &next);

        let mut metadata = base_metadata(task_id, "complete", TaskStatus::Done);
        metadata.insert("evidence".to_string(), json!(result.evidence));
        metadata.insert("unlocked".to_string(), json!(unlocked));

        Ok(TransitionOutcome {
            state: next,
            event_metadata: metadata,
            unlocked,
        })
    }

    /// `{pending, in_progress} -> blocked`. `reason` is required and stored
    /// as evidence.
    pub fn block(task_id: &str, reason: &str, state: &ExecutionState) -> Result<TransitionOutcome, RoadyError> {
        if reason.trim().is_empty() {
            return Err(RoadyError::InvalidIdentifier("block reason must not be empty".into()));
        }
        require_status(state, task_id, "block", &[TaskStatus::Pending, TaskStatus::InProgress])?;

        let mut next = state.clone();
        let mut result = next.result_or_default(task_id);
        result.status = TaskStatus::Blocked;
        result.evidence.push(reason.to_string());
        next.results.insert(task_id.to_string(), result);
        next.updated_at = Utc::now();

        let mut metadata = base_metadata(task_id, "block", TaskStatus::Blocked);
        metadata.insert("reason".to_string(), json!(reason));

        Ok(TransitionOutcome {
            state: next,
            event_metadata: metadata,
            unlocked: Vec::new(),
        })
    }

    /// `blocked -> pending`.
    pub fn unblock(task_id: &str, state: &ExecutionState) -> Result<TransitionOutcome, RoadyError> {
        require_status(state, task_id, "unblock", &[TaskStatus::Blocked])?;

        let mut next = state.clone();
        let mut result = next.result_or_default(task_id);
        result.status = TaskStatus::Pending;
        next.results.insert(task_id.to_string(), result);
        next.updated_at = Utc::now();

        Ok(TransitionOutcome {
            state: next,
            event_metadata: base_metadata(task_id, "unblock", TaskStatus::Pending),
            unlocked: Vec::new(),
        })
    }

    /// `done -> verified`. A verifier actor must be present; it is not
    /// required to differ from the task's owner.
    pub fn verify(task_id: &str, verifier: &str, state: &ExecutionState) -> Result<TransitionOutcome, RoadyError> {
        if verifier.trim().is_empty() {
            return Err(RoadyError::InvalidIdentifier("verifier must not be empty".into()));
        }
        require_status(state, task_id, "verify", &[TaskStatus::Done])?;

        let mut next = state.clone();
        let mut result = next.result_or_default(task_id);
        result.status = TaskStatus::Verified;
        next.results.insert(task_id.to_string(), result);
        next.updated_at = Utc::now();

        let mut metadata = base_metadata(task_id, "verify", TaskStatus::Verified);
        metadata.insert("verifier".to_string(), json!(verifier));

        Ok(TransitionOutcome {
            state: next,
            event_metadata: metadata,
            unlocked: Vec::new(),
        })
    }

    /// `in_progress -> pending`. Resets ownership; accumulates elapsed
    /// minutes the same way `complete` does.
    pub fn stop(task_id: &str, state: &ExecutionState) -> Result<TransitionOutcome, RoadyError> {
        require_status(state, task_id, "stop", &[TaskStatus::InProgress])?;

        let mut next = state.clone();
        let mut result = next.result_or_default(task_id);
        result.elapsed_minutes += elapsed_since(result.started_at);
        result.status = TaskStatus::Pending;
        result.owner = None;
        result.started_at = None;
        next.results.insert(task_id.to_string(), result);
        next.updated_at = Utc::now();

        Ok(TransitionOutcome {
            state: next,
            event_metadata: base_metadata(task_id, "stop", TaskStatus::Pending),
            unlocked: Vec::new(),
        })
    }

    /// `done -> pending`. `reason` is recorded as evidence.
    pub fn reopen(task_id: &str, reason: &str, state: &ExecutionState) -> Result<TransitionOutcome, RoadyError> {
        require_status(state, task_id, "reopen", &[TaskStatus::Done])?;

        let mut next = state.clone();
        let mut result = next.result_or_default(task_id);
        result.status = TaskStatus::Pending;
        if !reason.trim().is_empty() {
            result.evidence.push(format!("reopened: {reason}"));
        }
        next.results.insert(task_id.to_string(), result);
        next.updated_at = Utc::now();

        let mut metadata = base_metadata(task_id, "reopen", TaskStatus::Pending);
        metadata.insert("reason".to_string(), json!(reason));

        Ok(TransitionOutcome {
            state: next,
            event_metadata: metadata,
            unlocked: Vec::new(),
        })
    }
}

fn elapsed_since(started_at: Option<chrono::DateTime<Utc>>) -> u64 {
    match started_at {
        Some(t) => {
            let minutes = (Utc::now() - t).num_minutes();
            minutes.max(0) as u64
        }
        None => 0,
    }
}
