//! Task finalization (§2 components 5/6 boundary, §4.1's `TaskExecutionContext`
//! classification consumed here): decides whether a task is done, blocked, or
//! needs another pass, and drives the task state machine + reenqueuer accordingly.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use tasker_shared::event_bus::{Event, EventBus};
use tasker_shared::models::orchestration::{ExecutionStatus, TaskExecutionContext};
use tasker_shared::state_machine::{TaskEvent, TaskState, TaskStateMachine};
use tasker_shared::OrchestrationResult;

use crate::reenqueue::Reenqueuer;

/// What the finalizer decided to do with a task, for the coordinator and
/// test assertions to inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizationAction {
    Completed,
    Failed,
    Reenqueued,
    NoAction,
}

#[derive(Debug, Clone)]
pub struct FinalizationResult {
    pub task_uuid: Uuid,
    pub action: FinalizationAction,
    pub total_steps: i64,
    pub completed_steps: i64,
    pub reason: Option<String>,
}

/// Advances a task's state machine based on its [`TaskExecutionContext`] and,
/// when more work remains, hands off to the reenqueuer (§4.1, §4.5).
#[derive(Debug, Clone)]
pub struct TaskFinalizer {
    pool: PgPool,
    event_bus: EventBus,
    processor_uuid: Uuid,
    reenqueuer: Arc<dyn Reenqueuer>,
}

impl TaskFinalizer {
    pub fn new(
        pool: PgPool,
        event_bus: EventBus,
        processor_uuid: Uuid,
        reenqueuer: Arc<dyn Reenqueuer>,
    ) -> Self {
        Self {
            pool,
            event_bus,
            processor_uuid,
            reenqueuer,
        }
    }

    /// Classifies `context.execution_status` and dispatches to the matching
    /// handler (§4.4: "a small dispatcher over the task's execution_status").
    /// A task with no steps at all has no sensible classification and is
    /// routed to [`Self::handle_unclear_state`] rather than any of the four
    /// regular handlers.
    pub async fn finalize(
        &self,
        task_uuid: Uuid,
        context: &TaskExecutionContext,
    ) -> OrchestrationResult<FinalizationResult> {
        self.event_bus
            .publish(Event::TaskFinalizationStarted { task_uuid })
            .await;

        let machine = TaskStateMachine::for_task(task_uuid, self.pool.clone(), self.processor_uuid);
        let current = machine.current_state().await?;

        let result = if context.total_steps == 0 {
            self.handle_unclear_state(&machine, context).await
        } else {
            match context.execution_status {
                ExecutionStatus::AllComplete => self.complete_task(&machine, current, context).await,
                ExecutionStatus::BlockedByFailures => self.error_task(&machine, current, context).await,
                ExecutionStatus::HasReadySteps => {
                    self.handle_ready_steps_state(&machine, current, context).await
                }
                ExecutionStatus::WaitingForDependencies => {
                    self.handle_waiting_state(&machine, current, context).await
                }
                ExecutionStatus::Processing => self.handle_processing_state(context).await,
            }
        }?;

        self.event_bus
            .publish(Event::TaskFinalizationCompleted { task_uuid })
            .await;
        Ok(result)
    }

    async fn complete_task(
        &self,
        machine: &TaskStateMachine,
        current: TaskState,
        context: &TaskExecutionContext,
    ) -> OrchestrationResult<FinalizationResult> {
        if current == TaskState::Complete {
            return Ok(self.no_action(context, "task already complete"));
        }
        if current.is_terminal() {
            warn!(task_uuid = %context.task_uuid, ?current, "finalizer saw terminal non-complete state with AllComplete context");
            return Ok(self.no_action(context, "task already in a terminal state"));
        }

        machine.transition(TaskEvent::AllStepsComplete).await?;
        sqlx::query("UPDATE tasks SET complete = true, updated_at = now() WHERE task_uuid = $1")
            .bind(context.task_uuid)
            .execute(&self.pool)
            .await?;

        self.event_bus
            .publish(Event::TaskCompleted {
                task_uuid: context.task_uuid,
            })
            .await;

        info!(task_uuid = %context.task_uuid, "task completed");
        Ok(FinalizationResult {
            task_uuid: context.task_uuid,
            action: FinalizationAction::Completed,
            total_steps: context.total_steps,
            completed_steps: context.completed_steps,
            reason: Some("all non-skippable steps processed".to_string()),
        })
    }

    async fn error_task(
        &self,
        machine: &TaskStateMachine,
        current: TaskState,
        context: &TaskExecutionContext,
    ) -> OrchestrationResult<FinalizationResult> {
        if current.is_terminal() {
            return Ok(self.no_action(context, "task already in a terminal state"));
        }

        let reason = format!("{} of {} steps failed with no retries remaining", context.failed_steps, context.total_steps);
        machine
            .transition(TaskEvent::BlockedByFailures {
                reason: reason.clone(),
            })
            .await?;

        self.event_bus
            .publish(Event::TaskBlockedByFailures {
                task_uuid: context.task_uuid,
                reason: reason.clone(),
            })
            .await;

        warn!(task_uuid = %context.task_uuid, %reason, "task blocked by failures");
        Ok(FinalizationResult {
            task_uuid: context.task_uuid,
            action: FinalizationAction::Failed,
            total_steps: context.total_steps,
            completed_steps: context.completed_steps,
            reason: Some(reason),
        })
    }

    /// Steps are ready right now: move the task out of `pending`/`error` if
    /// needed, then hand off to the reenqueuer so a coordinator pass picks
    /// them up (§4.4 `handle_ready_steps_state`).
    async fn handle_ready_steps_state(
        &self,
        machine: &TaskStateMachine,
        current: TaskState,
        context: &TaskExecutionContext,
    ) -> OrchestrationResult<FinalizationResult> {
        if current.is_terminal() {
            return Ok(self.no_action(context, "task already in a terminal state"));
        }
        self.start_or_reenqueue_machine(machine, current, context).await?;
        self.schedule_reenqueue(context, "steps_ready").await
    }

    /// No step is ready yet and none are in flight. Re-checks for a failure
    /// that the readiness snapshot may have missed between evaluation and
    /// finalization (§4.4 `handle_waiting_state`'s defensive re-check), then
    /// falls through to the same hand-off as the ready-steps path.
    async fn handle_waiting_state(
        &self,
        machine: &TaskStateMachine,
        current: TaskState,
        context: &TaskExecutionContext,
    ) -> OrchestrationResult<FinalizationResult> {
        if context.failed_steps > 0 {
            warn!(task_uuid = %context.task_uuid, "waiting-state re-check found failures the ready-steps classification missed");
            return self.error_task(machine, current, context).await;
        }
        if current.is_terminal() {
            return Ok(self.no_action(context, "task already in a terminal state"));
        }
        self.start_or_reenqueue_machine(machine, current, context).await?;
        self.schedule_reenqueue(context, "waiting_for_dependencies").await
    }

    /// Steps are in flight on another executor; nothing for this pass to do
    /// (§4.4 `handle_processing_state`).
    async fn handle_processing_state(
        &self,
        context: &TaskExecutionContext,
    ) -> OrchestrationResult<FinalizationResult> {
        Ok(self.no_action(context, "steps in process elsewhere"))
    }

    /// No classification fits (currently only a task with zero steps);
    /// failing safe to `error` beats leaving the task silently stuck
    /// (§4.4 `handle_unclear_state`).
    async fn handle_unclear_state(
        &self,
        machine: &TaskStateMachine,
        context: &TaskExecutionContext,
    ) -> OrchestrationResult<FinalizationResult> {
        self.event_bus
            .publish(Event::WorkflowStateUnclear {
                task_uuid: context.task_uuid,
            })
            .await;

        let current = machine.current_state().await?;
        if current.is_terminal() {
            return Ok(self.no_action(context, "task already in a terminal state"));
        }
        machine
            .transition(TaskEvent::BlockedByFailures {
                reason: "execution context could not be classified".to_string(),
            })
            .await?;
        self.event_bus
            .publish(Event::TaskBlockedByFailures {
                task_uuid: context.task_uuid,
                reason: "execution context could not be classified".to_string(),
            })
            .await;
        Ok(FinalizationResult {
            task_uuid: context.task_uuid,
            action: FinalizationAction::Failed,
            total_steps: context.total_steps,
            completed_steps: context.completed_steps,
            reason: Some("unclear execution context".to_string()),
        })
    }

    async fn start_or_reenqueue_machine(
        &self,
        machine: &TaskStateMachine,
        current: TaskState,
        context: &TaskExecutionContext,
    ) -> OrchestrationResult<()> {
        if current == TaskState::Pending {
            machine.transition(TaskEvent::Start).await?;
            self.event_bus
                .publish(Event::TaskStarted {
                    task_uuid: context.task_uuid,
                })
                .await;
        } else if current == TaskState::Error {
            machine.transition(TaskEvent::Reenqueue).await?;
            self.event_bus
                .publish(Event::TaskReenqueueStarted {
                    task_uuid: context.task_uuid,
                    reason: "retry window elapsed".to_string(),
                })
                .await;
        }
        Ok(())
    }

    async fn schedule_reenqueue(
        &self,
        context: &TaskExecutionContext,
        reason: &str,
    ) -> OrchestrationResult<FinalizationResult> {
        self.event_bus
            .publish(Event::TaskReenqueueRequested {
                task_uuid: context.task_uuid,
                reason: reason.to_string(),
            })
            .await;

        let now = chrono::Utc::now();
        let visible_at = context.next_wakeup_at.map(|at| at.max(now)).unwrap_or(now);
        let delay_seconds = (visible_at - now).num_milliseconds() as f64 / 1000.0;
        if delay_seconds > 0.0 {
            self.event_bus
                .publish(Event::TaskReenqueueDelayed {
                    task_uuid: context.task_uuid,
                    delay_seconds,
                })
                .await;
        }

        if let Err(e) = self.reenqueuer.reenqueue(context.task_uuid, reason, visible_at).await {
            warn!(task_uuid = %context.task_uuid, error = %e, "reenqueue failed");
            self.event_bus
                .publish(Event::TaskReenqueueFailed {
                    task_uuid: context.task_uuid,
                    reason: e.to_string(),
                })
                .await;
            return Err(e);
        }

        Ok(FinalizationResult {
            task_uuid: context.task_uuid,
            action: FinalizationAction::Reenqueued,
            total_steps: context.total_steps,
            completed_steps: context.completed_steps,
            reason: Some(reason.to_string()),
        })
    }

    fn no_action(&self, context: &TaskExecutionContext, reason: &str) -> FinalizationResult {
        FinalizationResult {
            task_uuid: context.task_uuid,
            action: FinalizationAction::NoAction,
            total_steps: context.total_steps,
            completed_steps: context.completed_steps,
            reason: Some(reason.to_string()),
        }
    }
}
