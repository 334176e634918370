//! Resolved, typed configuration consumed by the orchestration core.
//!
//! Loading these values from YAML/TOML/env is out of scope for this crate (see
//! SPEC_FULL.md's ambient-stack section); every struct here has a sane `Default`
//! so tests and examples can build a [`crate::system_context::SystemContext`]
//! without a config loader.

use serde::{Deserialize, Serialize};

/// Backoff policy defaults used by the readiness evaluator when a step failure
/// did not carry a server-suggested `backoff_request_seconds`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub base_seconds: f64,
    pub cap_seconds: f64,
    pub default_retry_limit: i32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_seconds: 1.0,
            cap_seconds: 30.0,
            default_retry_limit: 3,
        }
    }
}

/// Execution concurrency and coordinator pass budgets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Default per-task step concurrency limit when the DAG's widest level is not known.
    pub default_step_concurrency_limit: usize,
    /// Maximum number of steps a single coordinator pass will execute before yielding.
    pub coordinator_pass_step_budget: usize,
    /// Maximum wall-clock time (ms) a single coordinator pass will run before yielding.
    pub coordinator_pass_time_budget_ms: u64,
    /// Poll interval used when steps are in-flight on another worker.
    pub short_poll_interval_ms: u64,
    /// Optional per-handler wall-clock timeout; `None` means handlers may block indefinitely.
    pub step_handler_timeout_ms: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_step_concurrency_limit: 10,
            coordinator_pass_step_budget: 100,
            coordinator_pass_time_budget_ms: 30_000,
            short_poll_interval_ms: 250,
            step_handler_timeout_ms: None,
        }
    }
}

/// Debounce window for the reenqueuer's `(task_id, reason)` dedup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReenqueueConfig {
    pub debounce_ms: u64,
}

impl Default for ReenqueueConfig {
    fn default() -> Self {
        Self { debounce_ms: 250 }
    }
}

/// Shared circuit breaker tuning, reused by every component-specific breaker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerComponentConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout_seconds: u64,
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            success_threshold: 3,
            recovery_timeout_seconds: 60,
        }
    }
}

/// Top-level resolved configuration for an orchestration process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct TaskerConfig {
    pub backoff: BackoffConfig,
    pub execution: ExecutionConfig,
    pub reenqueue: ReenqueueConfig,
    pub readiness_circuit_breaker: CircuitBreakerComponentConfig,
}
