//! The cross-project / organisation service: sibling-project discovery,
//! metric aggregation, and merged policy.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::audit::AuditService;
use crate::domain::PolicyConfig;
use crate::drift::{detect_intent_drift, detect_plan_drift, detect_policy_drift};
use crate::errors::RoadyError;
use crate::policy::{cross_repo, PolicyEvaluator};
use crate::workspace::types::OrgConfig;
use crate::workspace::WorkspaceRepository;

#[derive(Debug, Clone)]
pub struct ProjectSummary {
    pub name: String,
    pub path: PathBuf,
    pub wip: usize,
    pub velocity: f64,
    /// Intent, plan, and policy drift only — code drift needs a
    /// `CodeInspector`, which org-level aggregation does not have.
    pub drift_count: usize,
}

#[derive(Debug, Clone)]
pub struct OrgReport {
    pub projects: Vec<ProjectSummary>,
    pub merged_policy: PolicyConfig,
}

/// Discovers member projects under `root` and aggregates their WIP,
/// velocity, and drift counts into one report, along with their merged
/// policy (most restrictive `max_wip`, `allow_ai` ANDed, `budget_hours`
/// and `token_limit` summed).
pub fn aggregate(root: &Path, cancel: &CancellationToken) -> Result<OrgReport, RoadyError> {
    let discovered = cross_repo::discover_all(root, cancel)?;
    let mut projects = Vec::with_capacity(discovered.len());
    let mut merged_policy = PolicyConfig { max_wip: 0, allow_ai: true, token_limit: 0, budget_hours: 0.0 };

    for project in discovered {
        if cancel.is_cancelled() {
            return Err(RoadyError::Cancelled);
        }

        let spec = project.repository.load_spec()?;
        let locked = project.repository.load_locked_spec()?;
        let plan = project.repository.load_plan()?;
        let policy = project.repository.load_policy()?;
        let name = spec.as_ref().map(|s| s.id.clone()).unwrap_or_else(|| {
            project
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        });

        let state = project.repository.load_state(&name)?;
        let wip = state.wip_count();

        let audit = AuditService::new(&project.repository);
        let velocity = audit.get_velocity().unwrap_or(0.0);

        let mut drift_count = 0;
        if let Some(spec) = &spec {
            drift_count += detect_intent_drift(spec, locked.as_ref()).len();
            if let Some(plan) = &plan {
                drift_count += detect_plan_drift(spec, plan).len();
            }
        }
        if let Some(plan) = &plan {
            let evaluator = PolicyEvaluator::standard(&policy);
            let violations = evaluator.evaluate(plan, &state);
            drift_count += detect_policy_drift(&violations).len();
        }

        merged_policy = merged_policy.merge(&policy);
        projects.push(ProjectSummary {
            name,
            path: project.path,
            wip,
            velocity,
            drift_count,
        });
    }

    Ok(OrgReport { projects, merged_policy })
}

/// Loads (or defaults to empty) the organisation root's member list.
pub fn load_members(root_repository: &WorkspaceRepository) -> Result<OrgConfig, RoadyError> {
    Ok(root_repository.load_org()?.unwrap_or_default())
}
