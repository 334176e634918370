//! Error taxonomy for the tasker orchestration core.
//!
//! Library code returns [`TaskerResult`]/[`OrchestrationResult`] everywhere; `anyhow`
//! and `Box<dyn Error>` are reserved for test helpers.

use uuid::Uuid;

/// Crate-wide error type shared by models, the state machine, and the registry.
#[derive(Debug, thiserror::Error)]
pub enum TaskerError {
    #[error("database error during {operation}: {reason}")]
    DatabaseError { operation: String, reason: String },

    #[error("state transition failed for {entity_type} {entity_uuid}: {reason}")]
    StateTransitionFailed {
        entity_type: String,
        entity_uuid: Uuid,
        reason: String,
    },

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("registry error: {0}")]
    RegistryError(String),

    #[error("messaging error: {0}")]
    MessagingError(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl From<String> for TaskerError {
    fn from(reason: String) -> Self {
        TaskerError::ValidationError(reason)
    }
}

pub type TaskerResult<T> = Result<T, TaskerError>;

/// Orchestration-crate-specific error type. Converts freely to/from [`TaskerError`]
/// so orchestration code can propagate shared-crate errors with `?`.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("database error during {operation}: {reason}")]
    DatabaseError { operation: String, reason: String },

    #[error("state transition failed for {entity_type} {entity_uuid}: {reason}")]
    StateTransitionFailed {
        entity_type: String,
        entity_uuid: Uuid,
        reason: String,
    },

    #[error("readiness evaluation failed for task {task_uuid}: {reason}")]
    ReadinessEvaluationFailed { task_uuid: Uuid, reason: String },

    #[error("step handler failed for step {step_uuid}: {reason}")]
    HandlerFailed { step_uuid: Uuid, reason: String },

    #[error("reenqueue failed for task {task_uuid}: {reason}")]
    ReenqueueFailed { task_uuid: Uuid, reason: String },

    #[error("circuit breaker open for {component}")]
    CircuitOpen { component: String },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Tasker(#[from] TaskerError),
}

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;
