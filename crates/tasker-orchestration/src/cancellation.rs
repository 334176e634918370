//! External cancellation requests (§5, §8 S6).
//!
//! Cancellation is effected purely as a task state transition: in-flight
//! step handlers are not interrupted, they simply find their completion
//! guarded away once they finish (see `executor::StepExecutor::complete_step`).

use sqlx::PgPool;
use uuid::Uuid;

use tasker_shared::event_bus::{Event, EventBus};
use tasker_shared::state_machine::{TaskEvent, TaskStateMachine};
use tasker_shared::OrchestrationResult;

/// Transitions a task to `cancelled` and publishes `Event::TaskCancelled`.
/// A task already in a terminal state is left untouched; the legality check
/// in the transition engine would reject the edge anyway, but checking here
/// avoids publishing a misleading event for a no-op.
pub async fn cancel_task(
    pool: &PgPool,
    event_bus: &EventBus,
    processor_uuid: Uuid,
    task_uuid: Uuid,
    reason: impl Into<String>,
) -> OrchestrationResult<()> {
    let reason = reason.into();
    let machine = TaskStateMachine::for_task(task_uuid, pool.clone(), processor_uuid);
    if machine.current_state().await?.is_terminal() {
        return Ok(());
    }

    machine
        .transition(TaskEvent::Cancel {
            reason: reason.clone(),
        })
        .await?;

    event_bus
        .publish(Event::TaskCancelled { task_uuid, reason })
        .await;
    Ok(())
}
