//! Error types for the governance engine.
//!
//! This module defines a unified error enumeration used across the domain
//! model, workspace repository, event store, policy evaluator, task
//! coordinator, drift detector, billing reconciler, and cross-project
//! service. It integrates with `thiserror` to provide rich `Display`
//! implementations and error source chaining where applicable.
//!
//! Notes:
//! - Each variant carries contextual details via its message payload.
//! - Variants are grouped by kind (input, state, policy, persistence,
//!   cancellation, external) but kept as one flat enum so call sites can
//!   match without an extra discriminant.
//! - Propagation is verbatim with an operation-name prefix added by the
//!   facade layer via [`RoadyError::in_operation`]; no variant encodes the
//!   operation name itself.

use thiserror::Error;

#[derive(Error, Debug)]
/// Unified error enumeration for the governance engine.
pub enum RoadyError {
    // --- Input errors ---
    /// Identifier is empty or otherwise malformed.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Referenced task does not exist in the current plan.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// Dependency graph contains a cycle reachable from the given task.
    #[error("cycle detected in task dependency graph at: {0}")]
    CycleDetected(String),

    /// A rate identifier was reused.
    #[error("duplicate rate: {0}")]
    DuplicateRate(String),

    /// A requested template name is not recognized.
    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    // --- State errors ---
    /// No spec/plan has been loaded for the current workspace.
    #[error("no plan loaded")]
    NoPlanLoaded,

    /// Operation requires an approved plan.
    #[error("plan not approved")]
    PlanNotApproved,

    /// Task identifier is not part of the current plan.
    #[error("task not in plan: {0}")]
    TaskNotInPlan(String),

    /// The requested state transition is not legal from the task's current state.
    #[error("invalid transition `{event}` for task {task_id} in state {from}")]
    InvalidTransition {
        task_id: String,
        event: String,
        from: String,
    },

    /// Work-in-progress limit has been reached.
    #[error("WIP limit reached (current limit: {limit})")]
    WipLimitReached { limit: u32 },

    /// A dependency (local or cross-repo) is not yet done/verified.
    #[error("unmet dependency: {0}")]
    UnmetDependency(String),

    /// A cross-repo dependency's project could not be located on disk.
    #[error("external project not found: {0}")]
    ExternalProjectNotFound(String),

    /// Workspace directory already contains files; `initialize` refused.
    #[error("workspace already initialized at {0}")]
    AlreadyInitialized(String),

    // --- Policy errors ---
    /// AI usage is disabled by policy.
    #[error("AI usage disabled by policy")]
    AiDisabled,

    /// Token budget for AI usage has been exhausted.
    #[error("token limit reached")]
    TokenLimitReached,

    /// Billing budget has been exceeded.
    #[error("budget exceeded")]
    BudgetExceeded,

    // --- Persistence errors ---
    /// Writing an entity to the workspace directory failed.
    #[error("save failed for {0}: {1}")]
    SaveFailed(String, String),

    /// Reading an entity from the workspace directory failed.
    #[error("load failed for {0}: {1}")]
    LoadFailed(String, String),

    /// Appended event's `prev_hash` did not match the store's current tail.
    #[error("hash mismatch on append: expected prev_hash {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// `verify_integrity` found at least one broken link in the hash chain.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// Underlying filesystem I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization failure.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // --- Cancellation ---
    /// Operation observed cancellation before doing meaningful work.
    #[error("operation cancelled")]
    Cancelled,

    // --- External errors ---
    /// AI provider call failed (already retried once where the operation allows it).
    #[error("AI provider error: {0}")]
    AiProvider(String),

    /// Version-control command exited non-zero.
    #[error("version control error: {0}")]
    VersionControl(String),

    /// A plugin sync operation failed for a specific task.
    #[error("plugin error for task {task_id}: {message}")]
    Plugin { task_id: String, message: String },

    /// Catch-all for conditions not worth a dedicated variant.
    #[error("{0}")]
    Other(String),
}

impl RoadyError {
    /// Prefixes the error's display text with the name of the operation that
    /// surfaced it, without discarding the original variant.
    ///
    /// Used at facade boundaries, e.g.
    /// `repo.load_plan().map_err(|e| e.in_operation("plan.generate"))`.
    pub fn in_operation(self, operation: &str) -> Self {
        RoadyError::Other(format!("{operation}: {self}"))
    }
}
