//! Dependency-aware step readiness evaluation (§2 component 3, §4.1).

mod circuit_breaker;
mod query;

pub use circuit_breaker::TaskReadinessCircuitBreaker;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use tasker_shared::config::TaskerConfig;
use tasker_shared::models::orchestration::{StepReadinessStatus, TaskExecutionContext};
use tasker_shared::OrchestrationResult;

/// Evaluates readiness for one task at a time, behind a circuit breaker
/// protecting the store-facing round trip (§4.1).
#[derive(Debug, Clone)]
pub struct ReadinessEvaluator {
    pool: PgPool,
    config: TaskerConfig,
    breaker: TaskReadinessCircuitBreaker,
}

impl ReadinessEvaluator {
    pub fn new(pool: PgPool, config: TaskerConfig) -> Self {
        let breaker = TaskReadinessCircuitBreaker::new(config.readiness_circuit_breaker);
        Self {
            pool,
            config,
            breaker,
        }
    }

    pub fn circuit_breaker(&self) -> &TaskReadinessCircuitBreaker {
        &self.breaker
    }

    /// Returns every step's readiness status plus the task-level aggregate,
    /// evaluated against the current instant.
    pub async fn evaluate(
        &self,
        task_uuid: Uuid,
    ) -> OrchestrationResult<(Vec<StepReadinessStatus>, TaskExecutionContext)> {
        let pool = self.pool.clone();
        let backoff_config = self.config.backoff;
        let statuses = self
            .breaker
            .call(task_uuid, || async move {
                query::fetch_step_readiness(&pool, task_uuid, &backoff_config, fastrand::f64()).await
            })
            .await?;

        let now = Utc::now();
        let context = query::aggregate_execution_context(task_uuid, &statuses, now);
        Ok((statuses, context))
    }

    /// The subset of `evaluate`'s statuses that are immediately executable.
    pub async fn ready_steps(&self, task_uuid: Uuid) -> OrchestrationResult<Vec<StepReadinessStatus>> {
        let (statuses, _) = self.evaluate(task_uuid).await?;
        let now = Utc::now();
        Ok(statuses
            .into_iter()
            .filter(|s| s.ready_for_execution(now))
            .collect())
    }
}
