//! The application facade: a `Workspace` grouping the repository, the
//! audit log, the policy evaluator, and the optional external
//! collaborators, plus the thin per-concern services built on top of it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::audit::AuditService;
use crate::billing::BillingReconciler;
use crate::domain::{
    CostReport, DriftReport, ExecutionState, Plan, PolicyConfig, ProductSpec, Rate, TaskStatus, TimeEntry,
};
use crate::domain::Event;
use crate::drift::DriftDetector;
use crate::errors::RoadyError;
use crate::external::CodeInspector;
use crate::org::{self, OrgReport};
use crate::plan::{derive_tasks_from_spec, filter_valid_tasks, reconcile};
use crate::policy::PolicyEvaluator;
use crate::task::{TaskCoordinator, TransitionOutcome};
use crate::workspace::types::{RatesFile, TimeEntriesFile};
use crate::workspace::WorkspaceRepository;

/// Initializes global `tracing` output honoring `RUST_LOG` (`info` by
/// default when unset). The embedding binary calls this once at startup;
/// the library itself never installs a subscriber on its own, so tests and
/// other consumers that want their own subscriber are free to do so.
/// Safe to call more than once — later calls are a no-op.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Groups everything a service needs: the repository, an in-process
/// publisher used for every appended event, and the optional collaborators.
/// Constructed once by the embedding CLI and passed by reference.
pub struct Workspace {
    repository: WorkspaceRepository,
    inspector: Option<Box<dyn CodeInspector>>,
}

impl Workspace {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            repository: WorkspaceRepository::new(project_dir),
            inspector: None,
        }
    }

    pub fn with_inspector(mut self, inspector: Box<dyn CodeInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn repository(&self) -> &WorkspaceRepository {
        &self.repository
    }

    pub fn project_root(&self) -> &Path {
        self.repository.path().parent().unwrap_or_else(|| self.repository.path())
    }

    /// Appends an event and publishes it. Used directly for read-only
    /// telemetry; state-changing services route through `log_best_effort`.
    pub fn audit(&self) -> AuditService<'_> {
        AuditService::new(&self.repository)
    }

    /// Logs an event after a state-changing operation already succeeded.
    /// A logging failure is reported via `tracing::error!` and swallowed —
    /// the primary operation has already committed.
    fn log_best_effort(&self, action: &str, actor: &str, metadata: HashMap<String, Value>) {
        if let Err(err) = self.audit().log(action, actor, metadata) {
            error!(action, error = %err, "failed to append audit event after successful operation");
        }
    }

    fn check(cancel: &CancellationToken) -> Result<(), RoadyError> {
        if cancel.is_cancelled() {
            return Err(RoadyError::Cancelled);
        }
        Ok(())
    }
}

pub struct PlanService;

impl PlanService {
    pub fn generate(workspace: &Workspace, cancel: &CancellationToken) -> Result<Plan, RoadyError> {
        Workspace::check(cancel)?;
        let repo = workspace.repository();
        let spec = repo
            .load_spec()?
            .ok_or_else(|| RoadyError::Other("no spec loaded".into()))?;

        let proposed = derive_tasks_from_spec(&spec);
        let existing = repo.load_plan()?;
        let plan = reconcile(existing.as_ref(), proposed, &spec.id, uuid::Uuid::now_v7().to_string())?;
        repo.save_plan(&plan)?;

        workspace.log_best_effort("plan.generate", "cli", HashMap::from([("spec_id".to_string(), json!(spec.id))]));
        Ok(plan)
    }

    pub fn approve(workspace: &Workspace, cancel: &CancellationToken) -> Result<Plan, RoadyError> {
        Workspace::check(cancel)?;
        let repo = workspace.repository();
        let mut plan = repo.load_plan()?.ok_or(RoadyError::NoPlanLoaded)?;
        plan.approval_status = crate::domain::ApprovalStatus::Approved;
        plan.updated_at = chrono::Utc::now();
        repo.save_plan(&plan)?;
        workspace.log_best_effort("plan.approve", "cli", HashMap::new());
        Ok(plan)
    }

    pub fn reject(workspace: &Workspace, cancel: &CancellationToken) -> Result<Plan, RoadyError> {
        Workspace::check(cancel)?;
        let repo = workspace.repository();
        let mut plan = repo.load_plan()?.ok_or(RoadyError::NoPlanLoaded)?;
        plan.approval_status = crate::domain::ApprovalStatus::Rejected;
        plan.updated_at = chrono::Utc::now();
        repo.save_plan(&plan)?;
        workspace.log_best_effort("plan.reject", "cli", HashMap::new());
        Ok(plan)
    }

    /// Drops orphan `TaskResult`s: those whose task id is no longer in the
    /// plan and whose feature id is no longer in the spec.
    pub fn prune(workspace: &Workspace, cancel: &CancellationToken) -> Result<ExecutionState, RoadyError> {
        Workspace::check(cancel)?;
        let repo = workspace.repository();
        let plan = repo.load_plan()?.ok_or(RoadyError::NoPlanLoaded)?;
        let spec = repo.load_spec()?.ok_or_else(|| RoadyError::Other("no spec loaded".into()))?;
        let mut state = repo.load_state(&plan.spec_id)?;

        let valid_task_ids: std::collections::HashSet<String> = plan.task_ids().into_iter().map(String::from).collect();
        let valid_feature_ids: std::collections::HashSet<String> = spec.feature_ids().into_iter().map(String::from).collect();

        state.results.retain(|task_id, _| {
            valid_task_ids.contains(task_id)
                || plan
                    .task(task_id)
                    .map(|t| valid_feature_ids.contains(&t.feature_id))
                    .unwrap_or(false)
        });
        state.updated_at = chrono::Utc::now();
        repo.save_state(&state)?;
        workspace.log_best_effort("plan.prune", "cli", HashMap::new());
        Ok(state)
    }

    /// Keeps only tasks backed by a valid id or feature, without touching
    /// execution state — used ahead of reconciliation when proposing a
    /// filtered task list (e.g. after an AI decomposition).
    pub fn filter_tasks(plan: &Plan, spec: &ProductSpec) -> Vec<crate::domain::Task> {
        let valid_task_ids: std::collections::HashSet<String> = plan.task_ids().into_iter().map(String::from).collect();
        let valid_feature_ids: std::collections::HashSet<String> = spec.feature_ids().into_iter().map(String::from).collect();
        filter_valid_tasks(plan.tasks.clone(), &valid_task_ids, &valid_feature_ids)
    }
}

pub struct TaskService;

impl TaskService {
    fn apply(
        workspace: &Workspace,
        outcome: TransitionOutcome,
    ) -> Result<ExecutionState, RoadyError> {
        workspace.repository().save_state(&outcome.state)?;
        workspace.log_best_effort("task.transition", "cli", outcome.event_metadata);
        Ok(outcome.state)
    }

    pub fn start(
        workspace: &Workspace,
        task_id: &str,
        owner: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionState, RoadyError> {
        Workspace::check(cancel)?;
        let repo = workspace.repository();
        let plan = repo.load_plan()?.ok_or(RoadyError::NoPlanLoaded)?;
        let state = repo.load_state(&plan.spec_id)?;
        let policy = repo.load_policy()?;
        let evaluator = PolicyEvaluator::standard(&policy);
        let outcome = TaskCoordinator::start(
            task_id,
            owner,
            &plan,
            &state,
            &policy,
            &evaluator,
            workspace.project_root(),
            cancel,
        )?;
        Self::apply(workspace, outcome)
    }

    pub fn complete(
        workspace: &Workspace,
        task_id: &str,
        evidence: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(ExecutionState, Vec<String>), RoadyError> {
        Workspace::check(cancel)?;
        let repo = workspace.repository();
        let plan = repo.load_plan()?.ok_or(RoadyError::NoPlanLoaded)?;
        let state = repo.load_state(&plan.spec_id)?;
        let outcome = TaskCoordinator::complete(task_id, evidence, &plan, &state)?;
        let unlocked = outcome.unlocked.clone();
        let state = Self::apply(workspace, outcome)?;
        Ok((state, unlocked))
    }

    pub fn block(
        workspace: &Workspace,
        task_id: &str,
        reason: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionState, RoadyError> {
        Workspace::check(cancel)?;
        let repo = workspace.repository();
        let plan = repo.load_plan()?.ok_or(RoadyError::NoPlanLoaded)?;
        let state = repo.load_state(&plan.spec_id)?;
        let outcome = TaskCoordinator::block(task_id, reason, &state)?;
        Self::apply(workspace, outcome)
    }

    pub fn unblock(workspace: &Workspace, task_id: &str, cancel: &CancellationToken) -> Result<ExecutionState, RoadyError> {
        Workspace::check(cancel)?;
        let repo = workspace.repository();
        let plan = repo.load_plan()?.ok_or(RoadyError::NoPlanLoaded)?;
        let state = repo.load_state(&plan.spec_id)?;
        let outcome = TaskCoordinator::unblock(task_id, &state)?;
        Self::apply(workspace, outcome)
    }

    pub fn verify(
        workspace: &Workspace,
        task_id: &str,
        verifier: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionState, RoadyError> {
        Workspace::check(cancel)?;
        let repo = workspace.repository();
        let plan = repo.load_plan()?.ok_or(RoadyError::NoPlanLoaded)?;
        let state = repo.load_state(&plan.spec_id)?;
        let outcome = TaskCoordinator::verify(task_id, verifier, &state)?;
        Self::apply(workspace, outcome)
    }

    pub fn stop(workspace: &Workspace, task_id: &str, cancel: &CancellationToken) -> Result<ExecutionState, RoadyError> {
        Workspace::check(cancel)?;
        let repo = workspace.repository();
        let plan = repo.load_plan()?.ok_or(RoadyError::NoPlanLoaded)?;
        let state = repo.load_state(&plan.spec_id)?;
        let outcome = TaskCoordinator::stop(task_id, &state)?;
        Self::apply(workspace, outcome)
    }

    pub fn reopen(
        workspace: &Workspace,
        task_id: &str,
        reason: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionState, RoadyError> {
        Workspace::check(cancel)?;
        let repo = workspace.repository();
        let plan = repo.load_plan()?.ok_or(RoadyError::NoPlanLoaded)?;
        let state = repo.load_state(&plan.spec_id)?;
        let outcome = TaskCoordinator::reopen(task_id, reason, &state)?;
        Self::apply(workspace, outcome)
    }
}

pub struct DriftService;

impl DriftService {
    pub fn detect(workspace: &Workspace, cancel: &CancellationToken) -> Result<DriftReport, RoadyError> {
        Workspace::check(cancel)?;
        let repo = workspace.repository();
        let spec = repo.load_spec()?.ok_or_else(|| RoadyError::Other("no spec loaded".into()))?;
        let locked = repo.load_locked_spec()?;
        let plan = repo.load_plan()?.unwrap_or_else(|| Plan::new("", &spec.id, Vec::new()));
        let state = repo.load_state(&plan.spec_id)?;
        let policy = repo.load_policy()?;
        let evaluator = PolicyEvaluator::standard(&policy);
        let violations = evaluator.evaluate(&plan, &state);

        struct NullInspector;
        impl CodeInspector for NullInspector {
            fn file_exists(&self, _path: &str) -> bool {
                true
            }
            fn file_not_empty(&self, _path: &str) -> bool {
                true
            }
            fn git_status(&self, _path: &str) -> crate::external::GitStatus {
                crate::external::GitStatus::Clean
            }
        }
        let null_inspector = NullInspector;
        let inspector: &dyn CodeInspector = workspace.inspector.as_deref().unwrap_or(&null_inspector);

        Ok(DriftDetector::detect(&spec, locked.as_ref(), &plan, &state, inspector, &violations))
    }

    /// Records a previously computed report for debt tracking: one
    /// `drift.detected` event per issue, keyed by `component = drift_type`.
    pub fn record(workspace: &Workspace, report: &DriftReport) {
        for issue in &report.issues {
            let mut metadata = HashMap::new();
            metadata.insert("component".to_string(), json!(format!("{:?}", issue.drift_type).to_lowercase()));
            metadata.insert("category".to_string(), json!(issue.category));
            metadata.insert("severity".to_string(), json!(format!("{:?}", issue.severity).to_lowercase()));
            metadata.insert("message".to_string(), json!(issue.message));
            workspace.log_best_effort("drift.detected", "system", metadata);
        }
    }

    pub fn accept(workspace: &Workspace, cancel: &CancellationToken) -> Result<(), RoadyError> {
        Workspace::check(cancel)?;
        let repo = workspace.repository();
        let spec = repo.load_spec()?.ok_or_else(|| RoadyError::Other("no spec loaded".into()))?;
        let (locked, metadata) = DriftDetector::accept_drift(&spec);
        repo.save_locked_spec(&locked)?;
        workspace.log_best_effort("drift.accepted", "system", metadata);
        Ok(())
    }
}

pub struct BillingService;

impl BillingService {
    pub fn cost_report(workspace: &Workspace, filter_task_id: Option<&str>) -> Result<CostReport, RoadyError> {
        let repo = workspace.repository();
        let plan = repo.load_plan()?.unwrap_or_else(|| Plan::new("", "", Vec::new()));
        let state = repo.load_state(&plan.spec_id)?;
        let rates = repo.load_rates()?;
        let time_entries = repo.load_time_entries()?;
        Ok(BillingReconciler::cost_report(&plan, &state, &rates, &time_entries, None, filter_task_id))
    }

    pub fn budget_status(workspace: &Workspace) -> Result<crate::domain::BudgetStatus, RoadyError> {
        let repo = workspace.repository();
        let plan = repo.load_plan()?.unwrap_or_else(|| Plan::new("", "", Vec::new()));
        let state = repo.load_state(&plan.spec_id)?;
        let rates = repo.load_rates()?;
        let time_entries = repo.load_time_entries()?;
        let policy = repo.load_policy()?;
        Ok(BillingReconciler::budget_status(&plan, &state, &rates, &time_entries, &policy))
    }

    pub fn log_time(workspace: &Workspace, entry: TimeEntry) -> Result<(), RoadyError> {
        let repo = workspace.repository();
        let mut entries = repo.load_time_entries()?;
        entries.entries.push(entry.clone());
        repo.save_time_entries(&entries)?;
        workspace.log_best_effort(
            "billing.time_logged",
            "cli",
            HashMap::from([("task_id".to_string(), json!(entry.task_id)), ("minutes".to_string(), json!(entry.minutes))]),
        );
        Ok(())
    }

    pub fn add_rate(workspace: &Workspace, rate: Rate) -> Result<(), RoadyError> {
        let repo = workspace.repository();
        let mut rates = repo.load_rates()?;
        if rates.rates.iter().any(|r| r.id == rate.id) {
            return Err(RoadyError::DuplicateRate(rate.id));
        }
        let rate_id = rate.id.clone();
        rates.rates.push(rate);
        repo.save_rates(&rates)?;
        workspace.log_best_effort("billing.rate_added", "cli", HashMap::from([("rate_id".to_string(), json!(rate_id))]));
        Ok(())
    }
}

pub struct OrgService;

impl OrgService {
    pub fn aggregate(workspace: &Workspace, cancel: &CancellationToken) -> Result<OrgReport, RoadyError> {
        org::aggregate(workspace.project_root(), cancel)
    }
}

/// Computed metadata accessible without loading a full event: the task
/// status string at the time a transition event was recorded.
pub fn metadata_status(event: &Event) -> Option<TaskStatus> {
    event.metadata.get("status").and_then(|v| v.as_str()).and_then(|s| match s {
        "pending" => Some(TaskStatus::Pending),
        "in_progress" => Some(TaskStatus::InProgress),
        "blocked" => Some(TaskStatus::Blocked),
        "done" => Some(TaskStatus::Done),
        "verified" => Some(TaskStatus::Verified),
        _ => None,
    })
}
