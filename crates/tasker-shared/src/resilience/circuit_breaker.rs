//! Generic circuit breaker (§4.4). Component-specific wrappers (the
//! orchestration crate's task-readiness breaker) hold one of these and add
//! domain-specific naming and defaults.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::behavior::CircuitBreakerBehavior;
use super::metrics::CircuitBreakerMetrics;

/// The three states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Calls pass through normally; failures are counted.
    Closed,
    /// Calls are rejected outright until `recovery_timeout` elapses.
    Open,
    /// A limited number of probe calls are allowed through to test recovery.
    HalfOpen,
}

impl CircuitState {
    const CLOSED: u8 = 0;
    const OPEN: u8 = 1;
    const HALF_OPEN: u8 = 2;

    fn to_u8(self) -> u8 {
        match self {
            CircuitState::Closed => Self::CLOSED,
            CircuitState::Open => Self::OPEN,
            CircuitState::HalfOpen => Self::HALF_OPEN,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            Self::OPEN => CircuitState::Open,
            Self::HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Tuning for a single breaker instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (while closed) before the circuit opens.
    pub failure_threshold: u32,
    /// Consecutive successes (while half-open) before the circuit closes.
    pub success_threshold: u32,
    /// How long the circuit stays open before allowing a half-open probe.
    pub recovery_timeout: Duration,
}

/// A generic, thread-safe circuit breaker guarding a single flaky operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    consecutive_successes: AtomicU64,
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    half_open_calls: AtomicU64,
    total_duration_micros: AtomicU64,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: AtomicU8::new(CircuitState::Closed.to_u8()),
            consecutive_failures: AtomicU64::new(0),
            consecutive_successes: AtomicU64::new(0),
            total_calls: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            half_open_calls: AtomicU64::new(0),
            total_duration_micros: AtomicU64::new(0),
            opened_at: Mutex::new(None),
        }
    }

    fn state_raw(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: CircuitState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    fn trip_open(&self) {
        self.set_state(CircuitState::Open);
        *self.opened_at.lock().unwrap() = Some(Instant::now());
        self.consecutive_successes.store(0, Ordering::Relaxed);
    }
}

impl CircuitBreakerBehavior for CircuitBreaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> CircuitState {
        self.state_raw()
    }

    fn should_allow(&self) -> bool {
        match self.state_raw() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .lock()
                    .unwrap()
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.recovery_timeout {
                    self.set_state(CircuitState::HalfOpen);
                    self.half_open_calls.store(0, Ordering::Relaxed);
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);

        match self.state_raw() {
            CircuitState::HalfOpen => {
                self.half_open_calls.fetch_add(1, Ordering::Relaxed);
                let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
                if successes >= self.config.success_threshold as u64 {
                    self.set_state(CircuitState::Closed);
                    self.consecutive_successes.store(0, Ordering::Relaxed);
                }
            }
            CircuitState::Closed => {
                self.consecutive_successes.fetch_add(1, Ordering::Relaxed);
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.consecutive_successes.store(0, Ordering::Relaxed);

        match self.state_raw() {
            CircuitState::HalfOpen => {
                self.half_open_calls.fetch_add(1, Ordering::Relaxed);
                self.trip_open();
            }
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.config.failure_threshold as u64 {
                    self.trip_open();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn is_healthy(&self) -> bool {
        self.metrics().is_healthy()
    }

    fn force_open(&self) {
        self.trip_open();
    }

    fn force_closed(&self) {
        self.set_state(CircuitState::Closed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.consecutive_successes.store(0, Ordering::Relaxed);
        *self.opened_at.lock().unwrap() = None;
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        let total_calls = self.total_calls.load(Ordering::Relaxed);
        let success_count = self.success_count.load(Ordering::Relaxed);
        let failure_count = self.failure_count.load(Ordering::Relaxed);
        let total_duration = Duration::from_micros(self.total_duration_micros.load(Ordering::Relaxed));

        CircuitBreakerMetrics {
            total_calls,
            success_count,
            failure_count,
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            half_open_calls: self.half_open_calls.load(Ordering::Relaxed),
            total_duration,
            current_state: self.state_raw(),
            failure_rate: if total_calls == 0 {
                0.0
            } else {
                failure_count as f64 / total_calls as f64
            },
            success_rate: if total_calls == 0 {
                0.0
            } else {
                success_count as f64 / total_calls as f64
            },
            average_duration: if total_calls == 0 {
                Duration::ZERO
            } else {
                total_duration / total_calls as u32
            },
        }
    }
}
