//! The step-handler extension point (§4.3, §6).

use async_trait::async_trait;
use serde_json::Value;

use crate::models::core::{Task, WorkflowStep};

/// A lifecycle event a handler declares it publishes, registered into the
/// event catalog at task-handler registration time (§4.3, §6).
#[derive(Debug, Clone)]
pub struct CustomEventDeclaration {
    pub name: String,
    pub description: Option<String>,
}

/// The two classified failure kinds plus success. An unclassified panic or
/// unexpected error caught at the executor boundary is treated as `Retryable`
/// with no backoff hint (§4.3).
#[derive(Debug)]
pub enum StepHandlerOutcome {
    Success(Option<Value>),
    Failure {
        message: String,
        retryable: bool,
        backoff_request_seconds: Option<f64>,
    },
}

impl StepHandlerOutcome {
    pub fn retryable_failure(message: impl Into<String>) -> Self {
        StepHandlerOutcome::Failure {
            message: message.into(),
            retryable: true,
            backoff_request_seconds: None,
        }
    }

    pub fn permanent_failure(message: impl Into<String>) -> Self {
        StepHandlerOutcome::Failure {
            message: message.into(),
            retryable: false,
            backoff_request_seconds: None,
        }
    }
}

/// User-provided business logic for one named step. Implementors are
/// registered into a [`super::TaskTemplate`] by handler class reference (§6).
#[async_trait]
pub trait StepHandler: Send + Sync + std::fmt::Debug {
    /// `sequence` is every step of the task in an ordering that lets a
    /// handler read prior steps' `results` for cross-step data lookup.
    async fn process(
        &self,
        task: &Task,
        sequence: &[WorkflowStep],
        step: &WorkflowStep,
    ) -> StepHandlerOutcome;

    fn custom_events(&self) -> Vec<CustomEventDeclaration> {
        Vec::new()
    }
}
