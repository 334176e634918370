//! Wraps the readiness evaluator's store-facing calls so that a struggling
//! database does not turn into a hot polling loop across many tasks at once
//! (§4.1).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tasker_shared::config::CircuitBreakerComponentConfig;
use tasker_shared::resilience::{CircuitBreaker, CircuitBreakerBehavior, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
use tasker_shared::{OrchestrationError, OrchestrationResult};

/// Named, pre-configured breaker specifically for readiness evaluation calls.
#[derive(Debug, Clone)]
pub struct TaskReadinessCircuitBreaker {
    breaker: Arc<CircuitBreaker>,
}

impl TaskReadinessCircuitBreaker {
    pub fn new(config: CircuitBreakerComponentConfig) -> Self {
        Self {
            breaker: Arc::new(CircuitBreaker::new(
                "task_readiness_evaluator",
                CircuitBreakerConfig {
                    failure_threshold: config.failure_threshold,
                    success_threshold: config.success_threshold,
                    recovery_timeout: Duration::from_secs(config.recovery_timeout_seconds),
                },
            )),
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        !self.breaker.should_allow()
    }

    pub fn current_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.breaker.metrics()
    }

    pub fn force_open(&self) {
        self.breaker.force_open();
    }

    pub fn force_closed(&self) {
        self.breaker.force_closed();
    }

    /// Runs `op` if the circuit allows it, recording the outcome. Returns
    /// [`OrchestrationError::CircuitOpen`] without running `op` when tripped.
    pub async fn call<F, Fut, T>(&self, task_uuid: uuid::Uuid, op: F) -> OrchestrationResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = OrchestrationResult<T>>,
    {
        if !self.breaker.should_allow() {
            return Err(OrchestrationError::CircuitOpen {
                component: "task_readiness_evaluator".to_string(),
            });
        }

        let started = Instant::now();
        match op().await {
            Ok(value) => {
                self.breaker.record_success(started.elapsed());
                Ok(value)
            }
            Err(err) => {
                self.breaker.record_failure(started.elapsed());
                tracing::warn!(
                    task_uuid = %task_uuid,
                    error = %err,
                    "readiness evaluation call failed, recorded against circuit breaker"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerComponentConfig {
        CircuitBreakerComponentConfig {
            failure_threshold: 2,
            success_threshold: 1,
            recovery_timeout_seconds: 60,
        }
    }

    #[test]
    fn closed_by_default() {
        let cb = TaskReadinessCircuitBreaker::new(config());
        assert!(!cb.is_circuit_open());
    }

    #[tokio::test]
    async fn opens_after_consecutive_failures_and_rejects_calls() {
        let cb = TaskReadinessCircuitBreaker::new(config());
        for _ in 0..2 {
            let result: OrchestrationResult<()> = cb
                .call(uuid::Uuid::now_v7(), || async {
                    Err(OrchestrationError::ReadinessEvaluationFailed {
                        task_uuid: uuid::Uuid::now_v7(),
                        reason: "db down".to_string(),
                    })
                })
                .await;
            assert!(result.is_err());
        }
        assert!(cb.is_circuit_open());

        let result: OrchestrationResult<()> =
            cb.call(uuid::Uuid::now_v7(), || async { Ok(()) }).await;
        assert!(matches!(result, Err(OrchestrationError::CircuitOpen { .. })));
    }

    #[test]
    fn force_open_and_force_closed_override_state() {
        let cb = TaskReadinessCircuitBreaker::new(config());
        cb.force_open();
        assert!(cb.is_circuit_open());
        cb.force_closed();
        assert!(!cb.is_circuit_open());
    }
}
