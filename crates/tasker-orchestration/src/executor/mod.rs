//! Concurrent step execution (§2 component 4, §4.3).

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use tasker_shared::event_bus::{Event, EventBus};
use tasker_shared::models::core::{Task, WorkflowStep};
use tasker_shared::models::orchestration::StepReadinessStatus;
use tasker_shared::registry::{StepHandler, StepHandlerOutcome};
use tasker_shared::state_machine::{StepEvent, StepStateMachine};
use tasker_shared::{OrchestrationError, OrchestrationResult};

/// The per-step outcome the coordinator inspects after a batch executes.
#[derive(Debug)]
pub struct StepExecutionRecord {
    pub step_uuid: Uuid,
    pub outcome: StepOutcomeKind,
}

#[derive(Debug)]
pub enum StepOutcomeKind {
    Completed,
    FailedRetryable,
    FailedTerminal,
    /// Another executor already claimed this step between readiness
    /// evaluation and the claim attempt (§4.3 compare-and-set).
    ClaimLost,
    /// The handler finished, but the task was cancelled while it ran; the
    /// `in_progress -> complete` guard rejected the result (§5 cancellation).
    CancelledDiscarded,
}

/// Runs a batch of ready steps belonging to one task, honoring a concurrency
/// limit and translating handler outcomes into state transitions (§4.3).
#[derive(Debug, Clone)]
pub struct StepExecutor {
    pool: PgPool,
    event_bus: EventBus,
    processor_uuid: Uuid,
    concurrency_limit: usize,
    handler_timeout: Option<Duration>,
}

impl StepExecutor {
    pub fn new(
        pool: PgPool,
        event_bus: EventBus,
        processor_uuid: Uuid,
        concurrency_limit: usize,
        handler_timeout: Option<Duration>,
    ) -> Self {
        Self {
            pool,
            event_bus,
            processor_uuid,
            concurrency_limit,
            handler_timeout,
        }
    }

    #[instrument(skip(self, task, sequence, ready, handler_for))]
    pub async fn execute_batch<F>(
        &self,
        task: &Task,
        sequence: &[WorkflowStep],
        ready: &[StepReadinessStatus],
        handler_for: F,
    ) -> OrchestrationResult<Vec<StepExecutionRecord>>
    where
        F: Fn(Uuid) -> Option<Arc<dyn StepHandler>>,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit.max(1)));
        let futures = ready.iter().map(|status| {
            let semaphore = Arc::clone(&semaphore);
            let handler = handler_for(status.step_uuid);
            let sequence = sequence.to_vec();
            let task = task.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore not closed");
                self.execute_one(&task, &sequence, status.step_uuid, handler)
                    .await
            }
        });

        let results = join_all(futures).await;
        results.into_iter().collect()
    }

    async fn execute_one(
        &self,
        task: &Task,
        sequence: &[WorkflowStep],
        step_uuid: Uuid,
        handler: Option<Arc<dyn StepHandler>>,
    ) -> OrchestrationResult<StepExecutionRecord> {
        let claimed = self.claim_step(step_uuid).await?;
        let Some(step) = claimed else {
            return Ok(StepExecutionRecord {
                step_uuid,
                outcome: StepOutcomeKind::ClaimLost,
            });
        };

        let machine = StepStateMachine::for_step(step_uuid, self.pool.clone(), self.processor_uuid);
        machine.transition(StepEvent::Start).await?;
        self.event_bus
            .publish(Event::StepStarted {
                task_uuid: task.task_uuid,
                step_uuid,
            })
            .await;

        let Some(handler) = handler else {
            return self
                .fail_step(task.task_uuid, step_uuid, "no handler registered for step", true, false)
                .await;
        };

        self.event_bus
            .publish(Event::StepBeforeHandle {
                task_uuid: task.task_uuid,
                step_uuid,
            })
            .await;

        let outcome = match self.handler_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, handler.process(task, sequence, &step)).await {
                Ok(outcome) => outcome,
                Err(_) => StepHandlerOutcome::Failure {
                    message: "step handler timed out".to_string(),
                    retryable: true,
                    backoff_request_seconds: None,
                },
            },
            None => handler.process(task, sequence, &step).await,
        };

        match outcome {
            StepHandlerOutcome::Success(results) => {
                self.complete_step(task.task_uuid, step_uuid, results).await
            }
            StepHandlerOutcome::Failure {
                message,
                retryable,
                backoff_request_seconds,
            } => {
                let terminal = !retryable || step.attempts + 1 >= step.retry_limit;
                if let Some(seconds) = backoff_request_seconds {
                    self.record_backoff_hint(step_uuid, seconds).await?;
                    self.event_bus
                        .publish(Event::StepBackoff {
                            task_uuid: task.task_uuid,
                            step_uuid,
                            backoff_request_seconds: seconds,
                        })
                        .await;
                }
                self.fail_step(task.task_uuid, step_uuid, &message, retryable, terminal)
                    .await
            }
        }
    }

    async fn claim_step(&self, step_uuid: Uuid) -> OrchestrationResult<Option<WorkflowStep>> {
        let claimed: Option<WorkflowStep> = sqlx::query_as(
            "UPDATE workflow_steps \
             SET in_process = true, attempts = attempts + 1, last_attempted_at = now(), updated_at = now() \
             WHERE workflow_step_uuid = $1 AND in_process = false AND processed = false \
             RETURNING *",
        )
        .bind(step_uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OrchestrationError::HandlerFailed {
            step_uuid,
            reason: e.to_string(),
        })?;

        Ok(claimed)
    }

    async fn record_backoff_hint(&self, step_uuid: Uuid, seconds: f64) -> OrchestrationResult<()> {
        sqlx::query("UPDATE workflow_steps SET backoff_request_seconds = $2 WHERE workflow_step_uuid = $1")
            .bind(step_uuid)
            .bind(seconds)
            .execute(&self.pool)
            .await
            .map_err(|e| OrchestrationError::HandlerFailed {
                step_uuid,
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn complete_step(
        &self,
        task_uuid: Uuid,
        step_uuid: Uuid,
        results: Option<serde_json::Value>,
    ) -> OrchestrationResult<StepExecutionRecord> {
        if self.task_is_cancelled(task_uuid).await? {
            warn!(task_uuid = %task_uuid, step_uuid = %step_uuid, "discarding step result: task cancelled mid-flight");
            self.event_bus
                .publish(Event::StepCancelled { task_uuid, step_uuid })
                .await;
            return Ok(StepExecutionRecord {
                step_uuid,
                outcome: StepOutcomeKind::CancelledDiscarded,
            });
        }

        let machine = StepStateMachine::for_step(step_uuid, self.pool.clone(), self.processor_uuid);
        machine
            .transition(StepEvent::Complete {
                results: results.clone(),
            })
            .await?;

        sqlx::query(
            "UPDATE workflow_steps SET processed = true, processed_at = now(), in_process = false, \
             results = $2, updated_at = now() WHERE workflow_step_uuid = $1",
        )
        .bind(step_uuid)
        .bind(&results)
        .execute(&self.pool)
        .await
        .map_err(|e| OrchestrationError::HandlerFailed {
            step_uuid,
            reason: e.to_string(),
        })?;

        self.event_bus
            .publish(Event::StepCompleted {
                task_uuid,
                step_uuid,
                results,
            })
            .await;

        info!(step_uuid = %step_uuid, "step completed");
        Ok(StepExecutionRecord {
            step_uuid,
            outcome: StepOutcomeKind::Completed,
        })
    }

    async fn fail_step(
        &self,
        task_uuid: Uuid,
        step_uuid: Uuid,
        message: &str,
        retryable: bool,
        terminal: bool,
    ) -> OrchestrationResult<StepExecutionRecord> {
        let machine = StepStateMachine::for_step(step_uuid, self.pool.clone(), self.processor_uuid);
        machine
            .transition(StepEvent::Fail {
                message: message.to_string(),
                retryable,
                backoff_request_seconds: None,
                terminal,
            })
            .await?;

        let attempts: i32 = sqlx::query_scalar(
            "UPDATE workflow_steps SET in_process = false, updated_at = now() \
             WHERE workflow_step_uuid = $1 RETURNING attempts",
        )
        .bind(step_uuid)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OrchestrationError::HandlerFailed {
            step_uuid,
            reason: e.to_string(),
        })?;

        self.event_bus
            .publish(Event::StepFailed {
                task_uuid,
                step_uuid,
                message: message.to_string(),
                retryable: retryable && !terminal,
            })
            .await;

        if !terminal {
            self.event_bus
                .publish(Event::StepRetryRequested {
                    task_uuid,
                    step_uuid,
                    attempt: attempts,
                })
                .await;
        }

        warn!(step_uuid = %step_uuid, terminal, "step failed");
        Ok(StepExecutionRecord {
            step_uuid,
            outcome: if terminal {
                StepOutcomeKind::FailedTerminal
            } else {
                StepOutcomeKind::FailedRetryable
            },
        })
    }

    async fn task_is_cancelled(&self, task_uuid: Uuid) -> OrchestrationResult<bool> {
        let machine = tasker_shared::state_machine::TaskStateMachine::for_task(
            task_uuid,
            self.pool.clone(),
            self.processor_uuid,
        );
        Ok(machine.current_state().await? == tasker_shared::state_machine::TaskState::Cancelled)
    }
}
