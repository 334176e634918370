//! Trait unifying every circuit breaker in the system behind one interface, so
//! health reporting and metrics collection can work with `&dyn CircuitBreakerBehavior`
//! regardless of which component a breaker protects.

use std::time::Duration;

use super::{CircuitBreakerMetrics, CircuitState};

/// Unified interface for all circuit breaker implementations.
///
/// Object-safe: consumers needing uniform access to several breakers (health
/// reporting, admin endpoints) can hold `&dyn CircuitBreakerBehavior`. Concrete
/// types are preferred on hot paths.
pub trait CircuitBreakerBehavior: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;
    fn state(&self) -> CircuitState;

    /// Whether the circuit currently allows a call through. `true` when
    /// `Closed`, `true` when `HalfOpen` (a probe call), `true` when `Open` but
    /// the recovery timeout has elapsed (which also flips the state to
    /// `HalfOpen` as a side effect).
    fn should_allow(&self) -> bool;

    fn record_success(&self, duration: Duration);
    fn record_failure(&self, duration: Duration);
    fn is_healthy(&self) -> bool;
    fn force_open(&self);
    fn force_closed(&self);
    fn metrics(&self) -> CircuitBreakerMetrics;
}
