//! The domain model: `ProductSpec`, `Plan`, `Task`, `ExecutionState`,
//! `Event`, `PolicyConfig`, `Rate`, `TimeEntry`, and the derived drift/debt
//! views, each with their invariants and (where relevant) a deterministic
//! content hash.

pub mod billing;
pub mod debt;
pub mod drift;
pub mod event;
pub mod plan;
pub mod policy;
pub mod spec;
pub mod state;

pub use billing::{BudgetStatus, CostReport, Rate, TaxConfig, TaxMode, TimeEntry};
pub use debt::{BurndownPoint, DebtItem, DebtKind, DebtScore, ForecastResult, VelocityTrend};
pub use drift::{DriftIssue, DriftType, Report as DriftReport, Severity};
pub use event::Event;
pub use plan::{ApprovalStatus, Plan, Task};
pub use policy::PolicyConfig;
pub use spec::{Feature, LockedSpec, Priority, ProductSpec, Requirement};
pub use state::{ExecutionState, ExternalRef, TaskResult, TaskStatus};
