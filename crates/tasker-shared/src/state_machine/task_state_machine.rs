//! Task-entity binding of the generic transition engine (§4.6).

use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::TaskerResult;

use super::engine::{transition, TransitionLog, TransitionOutcome};
use super::events::TaskEvent;
use super::states::{legal_task_transition, TaskState};

/// Drives the `tasks` transition log for a single task.
///
/// Construct one per transition attempt via [`Self::for_task`], then call
/// [`Self::transition`].
#[derive(Debug, Clone)]
pub struct TaskStateMachine {
    task_uuid: Uuid,
    pool: PgPool,
    processor_uuid: Uuid,
}

impl TaskStateMachine {
    pub fn for_task(task_uuid: Uuid, pool: PgPool, processor_uuid: Uuid) -> Self {
        Self {
            task_uuid,
            pool,
            processor_uuid,
        }
    }

    /// Reads the current `most_recent` state without taking a lock.
    pub async fn current_state(&self) -> TaskerResult<TaskState> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT to_state FROM task_transitions WHERE entity_uuid = $1 AND most_recent = true",
        )
        .bind(self.task_uuid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((state,)) => state.parse().unwrap_or(TaskState::Pending),
            None => TaskState::Pending,
        })
    }

    /// Applies `event`, inserting a new `most_recent` transition row if legal.
    pub async fn transition(&self, event: TaskEvent) -> TaskerResult<TransitionOutcome> {
        transition(
            self,
            &self.pool,
            event.target_state(),
            self.processor_uuid,
            event.metadata(),
            false,
        )
        .await
    }
}

impl TransitionLog for TaskStateMachine {
    type State = TaskState;

    fn entity_table(&self) -> &'static str {
        "tasks"
    }

    fn transition_table(&self) -> &'static str {
        "task_transitions"
    }

    fn entity_id_column(&self) -> &'static str {
        "task_uuid"
    }

    fn entity_uuid(&self) -> Uuid {
        self.task_uuid
    }

    fn default_state(&self) -> TaskState {
        TaskState::Pending
    }

    fn is_legal(&self, from: TaskState, to: TaskState) -> bool {
        legal_task_transition(from, to)
    }
}
