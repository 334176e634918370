//! Finite state machines for tasks and workflow steps (§3, §4.6).

mod engine;
mod events;
mod states;
mod step_state_machine;
mod task_state_machine;

pub use engine::{TransitionLog, TransitionOutcome};
pub use events::{StepEvent, TaskEvent, TransitionActor};
pub use states::{legal_step_transition, legal_task_transition, TaskState, WorkflowStepState};
pub use step_state_machine::StepStateMachine;
pub use task_state_machine::TaskStateMachine;
