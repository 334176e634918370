//! Events that drive the task and step state machines.
//!
//! These are distinct from the lifecycle [`crate::event_bus::Event`]s published to
//! subscribers: `TaskEvent`/`StepEvent` are *inputs* to a transition, while the bus
//! events are *outputs* observed after one has been committed.

use serde_json::Value;
use uuid::Uuid;

use super::states::{TaskState, WorkflowStepState};

#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// `pending -> in_progress`. Fired when the coordinator first finds ready steps.
    Start,
    /// `in_progress -> complete`. Fired by the finalizer once every non-skippable
    /// step is processed.
    AllStepsComplete,
    /// `in_progress -> error`. Fired by the finalizer when any step has exhausted
    /// retries.
    BlockedByFailures { reason: String },
    /// `in_progress | error -> cancelled`. External cancellation request.
    Cancel { reason: String },
    /// Any non-terminal state `-> resolved_manually`. Out-of-band operator resolution.
    ResolveManually { reason: String },
    /// `error -> in_progress`. A reenqueued task resumes processing.
    Reenqueue,
}

impl TaskEvent {
    pub fn target_state(&self) -> TaskState {
        match self {
            TaskEvent::Start | TaskEvent::Reenqueue => TaskState::InProgress,
            TaskEvent::AllStepsComplete => TaskState::Complete,
            TaskEvent::BlockedByFailures { .. } => TaskState::Error,
            TaskEvent::Cancel { .. } => TaskState::Cancelled,
            TaskEvent::ResolveManually { .. } => TaskState::ResolvedManually,
        }
    }

    pub fn metadata(&self) -> Value {
        match self {
            TaskEvent::BlockedByFailures { reason }
            | TaskEvent::Cancel { reason }
            | TaskEvent::ResolveManually { reason } => serde_json::json!({ "reason": reason }),
            TaskEvent::Start | TaskEvent::AllStepsComplete | TaskEvent::Reenqueue => {
                serde_json::json!({})
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum StepEvent {
    /// `pending -> in_progress`. Guarded by dependencies-satisfied + backoff-expired.
    Start,
    /// `in_progress -> complete`.
    Complete { results: Option<Value> },
    /// `in_progress -> error`. `retryable` and `backoff_request_seconds` feed the
    /// next readiness evaluation (§4.2).
    Fail {
        message: String,
        retryable: bool,
        backoff_request_seconds: Option<f64>,
        terminal: bool,
    },
    /// `error -> pending`. Consumed by the retry path once backoff has been recorded.
    ResetForRetry,
    /// Any non-terminal state `-> cancelled`.
    Cancel,
    /// `pending -> resolved_manually`. Used for `skippable` steps (§9 open question).
    Skip,
}

impl StepEvent {
    pub fn target_state(&self) -> WorkflowStepState {
        match self {
            StepEvent::Start => WorkflowStepState::InProgress,
            StepEvent::Complete { .. } => WorkflowStepState::Complete,
            StepEvent::Fail { .. } => WorkflowStepState::Error,
            StepEvent::ResetForRetry => WorkflowStepState::Pending,
            StepEvent::Cancel => WorkflowStepState::Cancelled,
            StepEvent::Skip => WorkflowStepState::ResolvedManually,
        }
    }

    pub fn metadata(&self) -> Value {
        match self {
            StepEvent::Fail {
                message,
                retryable,
                backoff_request_seconds,
                terminal,
            } => serde_json::json!({
                "message": message,
                "retryable": retryable,
                "backoff_request_seconds": backoff_request_seconds,
                "terminal": terminal,
            }),
            StepEvent::Skip => serde_json::json!({ "reason": "skipped" }),
            _ => serde_json::json!({}),
        }
    }
}

/// Correlates a transition attempt with the originating actor, for audit metadata.
#[derive(Debug, Clone, Copy)]
pub struct TransitionActor {
    pub processor_uuid: Uuid,
}
