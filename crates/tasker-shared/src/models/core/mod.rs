//! Row-level entity types (§3). Plain `sqlx::FromRow` structs; no behavior
//! beyond what's needed to move rows in and out of the store.

mod named_step;
mod named_task;
mod task;
mod task_namespace;
mod workflow_step;
mod workflow_step_edge;

pub use named_step::NamedStep;
pub use named_task::NamedTask;
pub use task::Task;
pub use task_namespace::TaskNamespace;
pub use workflow_step::WorkflowStep;
pub use workflow_step_edge::WorkflowStepEdge;
