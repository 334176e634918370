//! Lifecycle events published after a transition has committed (§4.8).
//!
//! Earlier designs dispatched these by name (`handle_task_started`, ...) via a
//! method-name lookup. A tagged enum plus an exhaustive `match` in each
//! subscriber gets the compiler to flag missing handlers instead of silently
//! skipping an unmatched event name.

use serde_json::Value;
use uuid::Uuid;

/// One fact published to the bus. Every variant carries the ids a subscriber
/// needs to re-fetch full state rather than a denormalized payload, keeping
/// the bus a notification channel and not a second source of truth.
#[derive(Debug, Clone)]
pub enum Event {
    /// `task.initialize_requested`: a task request has been materialized into
    /// a `Task` row and its steps, before any coordinator pass runs it.
    TaskInitializeRequested {
        task_uuid: Uuid,
    },
    /// `task.start_requested` in the wire catalog: the task left `pending`
    /// for `in_progress` for the first time. Published once per task from
    /// [`crate::finalization`]'s ready/waiting handlers, before any step runs.
    TaskStarted {
        task_uuid: Uuid,
    },
    TaskCompleted {
        task_uuid: Uuid,
    },
    /// `task.failed`: the task was moved to `error` because its failed steps
    /// have no retries left and nothing else is ready or in flight.
    TaskBlockedByFailures {
        task_uuid: Uuid,
        reason: String,
    },
    TaskCancelled {
        task_uuid: Uuid,
        reason: String,
    },
    /// `task.reenqueue_started`: the task left `error` for `in_progress` to
    /// resume a prior attempt, the `error -> in_progress` counterpart to
    /// [`Event::TaskStarted`]'s initial `pending -> in_progress` transition.
    TaskReenqueueStarted {
        task_uuid: Uuid,
        reason: String,
    },
    /// `task.finalization_started`: the finalizer has begun classifying a
    /// task's execution context for this pass.
    TaskFinalizationStarted {
        task_uuid: Uuid,
    },
    /// `task.finalization_completed`: the finalizer reached a decision
    /// (complete, error, or hand-off) and is returning to its caller.
    TaskFinalizationCompleted {
        task_uuid: Uuid,
    },
    /// `task.reenqueue_requested`: the finalizer decided a task needs another
    /// pass and is about to ask the reenqueuer to schedule it.
    TaskReenqueueRequested {
        task_uuid: Uuid,
        reason: String,
    },
    /// `task.reenqueue_delayed`: the reenqueuer computed a non-zero delay
    /// before the task becomes visible again (backoff-driven hand-off).
    TaskReenqueueDelayed {
        task_uuid: Uuid,
        delay_seconds: f64,
    },
    /// `task.reenqueue_failed`: the reenqueuer's write to the work queue
    /// failed; the finalization result still reports `Reenqueued` optimistically
    /// only if this event was not published.
    TaskReenqueueFailed {
        task_uuid: Uuid,
        reason: String,
    },
    StepStarted {
        task_uuid: Uuid,
        step_uuid: Uuid,
    },
    /// `step.before_handle`: published immediately before the handler's
    /// `process` future is polled, distinct from `step.started`'s state
    /// transition which happens just before this.
    StepBeforeHandle {
        task_uuid: Uuid,
        step_uuid: Uuid,
    },
    StepCompleted {
        task_uuid: Uuid,
        step_uuid: Uuid,
        results: Option<Value>,
    },
    StepFailed {
        task_uuid: Uuid,
        step_uuid: Uuid,
        message: String,
        retryable: bool,
    },
    /// `step.retry_requested`: a failure was classified retryable and the
    /// step will become eligible again once its backoff elapses.
    StepRetryRequested {
        task_uuid: Uuid,
        step_uuid: Uuid,
        attempt: i32,
    },
    /// `step.backoff`: a handler supplied a server-suggested backoff window.
    StepBackoff {
        task_uuid: Uuid,
        step_uuid: Uuid,
        backoff_request_seconds: f64,
    },
    /// `step.cancelled`: a handler finished after its task was cancelled; the
    /// `in_progress -> complete` guard rejected the result.
    StepCancelled {
        task_uuid: Uuid,
        step_uuid: Uuid,
    },
    StepSkipped {
        task_uuid: Uuid,
        step_uuid: Uuid,
    },
    /// `workflow.state_unclear`: the finalizer saw an execution context it
    /// cannot classify into any of the five `ExecutionStatus` variants, or a
    /// task with no steps at all; fails safe to `error`.
    WorkflowStateUnclear {
        task_uuid: Uuid,
    },
    /// `workflow.error`: an unrecoverable condition outside the normal
    /// step-failure path (e.g. a transition guard rejected by a concurrent
    /// writer in a way the caller cannot retry within this pass).
    WorkflowError {
        task_uuid: Uuid,
        reason: String,
    },
}

impl Event {
    /// The task this event concerns, regardless of variant. Useful for
    /// routing/log correlation without an exhaustive match at every call site.
    pub fn task_uuid(&self) -> Uuid {
        match self {
            Event::TaskInitializeRequested { task_uuid }
            | Event::TaskStarted { task_uuid }
            | Event::TaskCompleted { task_uuid }
            | Event::TaskBlockedByFailures { task_uuid, .. }
            | Event::TaskCancelled { task_uuid, .. }
            | Event::TaskReenqueueStarted { task_uuid, .. }
            | Event::TaskFinalizationStarted { task_uuid }
            | Event::TaskFinalizationCompleted { task_uuid }
            | Event::TaskReenqueueRequested { task_uuid, .. }
            | Event::TaskReenqueueDelayed { task_uuid, .. }
            | Event::TaskReenqueueFailed { task_uuid, .. }
            | Event::StepStarted { task_uuid, .. }
            | Event::StepBeforeHandle { task_uuid, .. }
            | Event::StepCompleted { task_uuid, .. }
            | Event::StepFailed { task_uuid, .. }
            | Event::StepRetryRequested { task_uuid, .. }
            | Event::StepBackoff { task_uuid, .. }
            | Event::StepCancelled { task_uuid, .. }
            | Event::StepSkipped { task_uuid, .. }
            | Event::WorkflowStateUnclear { task_uuid }
            | Event::WorkflowError { task_uuid, .. } => *task_uuid,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::TaskInitializeRequested { .. } => "task_initialize_requested",
            Event::TaskStarted { .. } => "task_started",
            Event::TaskCompleted { .. } => "task_completed",
            Event::TaskBlockedByFailures { .. } => "task_failed",
            Event::TaskCancelled { .. } => "task_cancelled",
            Event::TaskReenqueueStarted { .. } => "task_reenqueue_started",
            Event::TaskFinalizationStarted { .. } => "task_finalization_started",
            Event::TaskFinalizationCompleted { .. } => "task_finalization_completed",
            Event::TaskReenqueueRequested { .. } => "task_reenqueue_requested",
            Event::TaskReenqueueDelayed { .. } => "task_reenqueue_delayed",
            Event::TaskReenqueueFailed { .. } => "task_reenqueue_failed",
            Event::StepStarted { .. } => "step_started",
            Event::StepBeforeHandle { .. } => "step_before_handle",
            Event::StepCompleted { .. } => "step_completed",
            Event::StepFailed { .. } => "step_failed",
            Event::StepRetryRequested { .. } => "step_retry_requested",
            Event::StepBackoff { .. } => "step_backoff",
            Event::StepCancelled { .. } => "step_cancelled",
            Event::StepSkipped { .. } => "step_skipped",
            Event::WorkflowStateUnclear { .. } => "workflow_state_unclear",
            Event::WorkflowError { .. } => "workflow_error",
        }
    }
}
