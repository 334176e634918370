use chrono::NaiveDateTime;
use serde_json::Value;
use uuid::Uuid;

/// A concrete step instance belonging to one task (§3).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkflowStep {
    pub workflow_step_uuid: Uuid,
    pub task_uuid: Uuid,
    pub named_step_uuid: Uuid,
    pub retryable: bool,
    pub retry_limit: i32,
    pub in_process: bool,
    pub processed: bool,
    pub processed_at: Option<NaiveDateTime>,
    pub attempts: i32,
    pub last_attempted_at: Option<NaiveDateTime>,
    pub backoff_request_seconds: Option<f64>,
    pub inputs: Option<Value>,
    pub results: Option<Value>,
    pub skippable: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl WorkflowStep {
    /// `attempts < retry_limit`, the attempt-budget half of retry eligibility
    /// (§4.1; the state/dependency half is computed by the readiness evaluator).
    pub fn has_attempts_remaining(&self) -> bool {
        self.attempts < self.retry_limit
    }
}
