use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::state_machine::WorkflowStepState;

/// Per-step readiness facts (§4.1). Produced by a pure function over raw row
/// data plus the current instant; holds no database handle.
#[derive(Debug, Clone)]
pub struct StepReadinessStatus {
    pub step_uuid: Uuid,
    pub name: String,
    pub current_state: WorkflowStepState,
    pub total_parents: i64,
    pub completed_parents: i64,
    pub attempts: i32,
    pub retry_limit: i32,
    pub retryable: bool,
    pub in_process: bool,
    pub processed: bool,
    pub skippable: bool,
    /// Count of direct parents that are permanently unable to complete
    /// (`cancelled`, or `error` with retries exhausted). A `skippable` step
    /// with a blocked parent would otherwise wait on `dependencies_satisfied`
    /// forever (§9 open question: skippable steps resolve to `resolved_manually`).
    pub blocked_parents: i64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl StepReadinessStatus {
    pub fn dependencies_satisfied(&self) -> bool {
        self.total_parents == self.completed_parents
    }

    /// A `skippable` step stuck behind a parent that will never complete.
    /// Only meaningful while the step itself is still `pending`.
    pub fn blocked_by_failed_parent(&self) -> bool {
        self.skippable && !self.dependencies_satisfied() && self.blocked_parents > 0
    }

    pub fn retry_eligible(&self) -> bool {
        self.retryable
            && self.attempts < self.retry_limit
            && matches!(
                self.current_state,
                WorkflowStepState::Pending | WorkflowStepState::Error
            )
    }

    pub fn backoff_expired(&self, now: DateTime<Utc>) -> bool {
        match self.next_retry_at {
            None => true,
            Some(at) => now >= at,
        }
    }

    /// The composite flag the executor batches on (§4.1 invariant 2).
    pub fn ready_for_execution(&self, now: DateTime<Utc>) -> bool {
        self.current_state == WorkflowStepState::Pending
            && self.dependencies_satisfied()
            && self.retry_eligible()
            && self.backoff_expired(now)
            && !self.in_process
            && !self.processed
    }
}
