//! Workflow-step-entity binding of the generic transition engine (§4.6).

use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::TaskerResult;

use super::engine::{transition, TransitionLog, TransitionOutcome};
use super::events::StepEvent;
use super::states::{legal_step_transition, WorkflowStepState};

/// Drives the `workflow_step_transitions` log for a single step.
#[derive(Debug, Clone)]
pub struct StepStateMachine {
    step_uuid: Uuid,
    pool: PgPool,
    processor_uuid: Uuid,
}

impl StepStateMachine {
    pub fn for_step(step_uuid: Uuid, pool: PgPool, processor_uuid: Uuid) -> Self {
        Self {
            step_uuid,
            pool,
            processor_uuid,
        }
    }

    pub async fn current_state(&self) -> TaskerResult<WorkflowStepState> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT to_state FROM workflow_step_transitions \
             WHERE entity_uuid = $1 AND most_recent = true",
        )
        .bind(self.step_uuid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((state,)) => state.parse().unwrap_or(WorkflowStepState::Pending),
            None => WorkflowStepState::Pending,
        })
    }

    /// Applies `event`. `Complete` and `Skip` are idempotent targets: re-delivering
    /// a completion for an already-complete step is a no-op rather than an error
    /// (§8 property 7, at-most-once effective application).
    pub async fn transition(&self, event: StepEvent) -> TaskerResult<TransitionOutcome> {
        let idempotent = matches!(event, StepEvent::Complete { .. } | StepEvent::Skip);
        transition(
            self,
            &self.pool,
            event.target_state(),
            self.processor_uuid,
            event.metadata(),
            idempotent,
        )
        .await
    }
}

impl TransitionLog for StepStateMachine {
    type State = WorkflowStepState;

    fn entity_table(&self) -> &'static str {
        "workflow_steps"
    }

    fn transition_table(&self) -> &'static str {
        "workflow_step_transitions"
    }

    fn entity_id_column(&self) -> &'static str {
        "workflow_step_uuid"
    }

    fn entity_uuid(&self) -> Uuid {
        self.step_uuid
    }

    fn default_state(&self) -> WorkflowStepState {
        WorkflowStepState::Pending
    }

    fn is_legal(&self, from: WorkflowStepState, to: WorkflowStepState) -> bool {
        legal_step_transition(from, to)
    }
}
