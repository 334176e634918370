//! Derived, read-only views produced by the readiness evaluator (§4.1).
//! Nothing here is persisted; these are computed fresh from a store snapshot
//! on every evaluation.

mod execution_context;
mod readiness_status;

pub use execution_context::{ExecutionStatus, HealthStatus, RecommendedAction, TaskExecutionContext};
pub use readiness_status::StepReadinessStatus;
