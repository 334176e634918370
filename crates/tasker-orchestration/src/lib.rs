//! Orchestration core: readiness evaluation, step execution, per-task
//! coordination, reenqueue, and finalization, built atop the state machines
//! and registry in `tasker_shared`.

pub mod cancellation;
pub mod coordinator;
pub mod executor;
pub mod finalization;
pub mod initializer;
pub mod readiness;
pub mod reenqueue;

pub use cancellation::cancel_task;
pub use coordinator::{CoordinatorPassResult, TaskCoordinator};
pub use executor::{StepExecutionRecord, StepExecutor, StepOutcomeKind};
pub use finalization::{FinalizationAction, FinalizationResult, TaskFinalizer};
pub use initializer::{TaskInitializer, TaskRequest};
pub use readiness::{ReadinessEvaluator, TaskReadinessCircuitBreaker};
pub use reenqueue::{ProductionReenqueuer, Reenqueuer, SynchronousReenqueuer};
