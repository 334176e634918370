//! State alphabets for the task and step finite state machines (§3, §4.6).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical task states (§3). `Error` may re-enter `InProgress` via reenqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    InProgress,
    Complete,
    Error,
    Cancelled,
    ResolvedManually,
}

impl TaskState {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Complete | TaskState::Cancelled | TaskState::ResolvedManually
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::InProgress => "in_progress",
            TaskState::Complete => "complete",
            TaskState::Error => "error",
            TaskState::Cancelled => "cancelled",
            TaskState::ResolvedManually => "resolved_manually",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskState::Pending),
            "in_progress" => Ok(TaskState::InProgress),
            "complete" => Ok(TaskState::Complete),
            "error" => Ok(TaskState::Error),
            "cancelled" => Ok(TaskState::Cancelled),
            "resolved_manually" => Ok(TaskState::ResolvedManually),
            other => Err(format!("unknown task state: {other}")),
        }
    }
}

/// Canonical workflow step states (§3). `Error` may re-enter `Pending` on retry reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStepState {
    Pending,
    InProgress,
    Complete,
    Error,
    Cancelled,
    ResolvedManually,
}

impl WorkflowStepState {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStepState::Complete
                | WorkflowStepState::Cancelled
                | WorkflowStepState::ResolvedManually
        )
    }

    /// States that satisfy a dependent step's "parent completed" check (§3 invariant 2(b)).
    pub const fn is_completion_state(self) -> bool {
        matches!(
            self,
            WorkflowStepState::Complete | WorkflowStepState::ResolvedManually
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            WorkflowStepState::Pending => "pending",
            WorkflowStepState::InProgress => "in_progress",
            WorkflowStepState::Complete => "complete",
            WorkflowStepState::Error => "error",
            WorkflowStepState::Cancelled => "cancelled",
            WorkflowStepState::ResolvedManually => "resolved_manually",
        }
    }
}

impl fmt::Display for WorkflowStepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStepState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkflowStepState::Pending),
            "in_progress" => Ok(WorkflowStepState::InProgress),
            "complete" => Ok(WorkflowStepState::Complete),
            "error" => Ok(WorkflowStepState::Error),
            "cancelled" => Ok(WorkflowStepState::Cancelled),
            "resolved_manually" => Ok(WorkflowStepState::ResolvedManually),
            other => Err(format!("unknown workflow step state: {other}")),
        }
    }
}

/// Legal `(from, to)` pairs for the task alphabet (§3, §4.6).
pub fn legal_task_transition(from: TaskState, to: TaskState) -> bool {
    use TaskState::*;
    matches!(
        (from, to),
        (Pending, InProgress)
            | (Pending, Cancelled)
            | (Pending, ResolvedManually)
            | (InProgress, Complete)
            | (InProgress, Error)
            | (InProgress, Cancelled)
            | (InProgress, ResolvedManually)
            | (Error, InProgress) // reenqueue
            | (Error, Cancelled)
            | (Error, ResolvedManually)
    )
}

/// Legal `(from, to)` pairs for the workflow step alphabet (§3, §4.6).
pub fn legal_step_transition(from: WorkflowStepState, to: WorkflowStepState) -> bool {
    use WorkflowStepState::*;
    matches!(
        (from, to),
        (Pending, InProgress)
            | (Pending, Cancelled)
            | (Pending, ResolvedManually)
            | (InProgress, Complete)
            | (InProgress, Error)
            | (InProgress, Cancelled)
            | (Error, Pending) // retry reset
            | (Error, Cancelled)
            | (Error, ResolvedManually)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_state_round_trips_through_display_and_from_str() {
        for state in [
            TaskState::Pending,
            TaskState::InProgress,
            TaskState::Complete,
            TaskState::Error,
            TaskState::Cancelled,
            TaskState::ResolvedManually,
        ] {
            let parsed: TaskState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn step_completion_states_match_spec_invariant_2b() {
        assert!(WorkflowStepState::Complete.is_completion_state());
        assert!(WorkflowStepState::ResolvedManually.is_completion_state());
        assert!(!WorkflowStepState::Error.is_completion_state());
        assert!(!WorkflowStepState::Pending.is_completion_state());
        assert!(!WorkflowStepState::InProgress.is_completion_state());
    }

    #[test]
    fn task_cannot_jump_directly_from_pending_to_complete() {
        assert!(!legal_task_transition(TaskState::Pending, TaskState::Complete));
    }

    #[test]
    fn task_error_may_reenter_in_progress_via_reenqueue() {
        assert!(legal_task_transition(TaskState::Error, TaskState::InProgress));
    }

    #[test]
    fn step_error_may_reset_to_pending_for_retry() {
        assert!(legal_step_transition(
            WorkflowStepState::Error,
            WorkflowStepState::Pending
        ));
        assert!(!legal_step_transition(
            WorkflowStepState::Complete,
            WorkflowStepState::Pending
        ));
    }

    #[test]
    fn terminal_states_have_no_outgoing_legal_transitions() {
        for to in [
            WorkflowStepState::Pending,
            WorkflowStepState::InProgress,
            WorkflowStepState::Complete,
            WorkflowStepState::Error,
            WorkflowStepState::Cancelled,
            WorkflowStepState::ResolvedManually,
        ] {
            assert!(!legal_step_transition(WorkflowStepState::Complete, to));
            assert!(!legal_step_transition(WorkflowStepState::Cancelled, to));
            assert!(!legal_step_transition(
                WorkflowStepState::ResolvedManually,
                to
            ));
        }
    }
}
