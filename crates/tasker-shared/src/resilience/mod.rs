//! Circuit breaker primitives shared by every component that wraps a flaky
//! store-facing operation (§4.4).

mod behavior;
mod circuit_breaker;
mod metrics;

pub use behavior::CircuitBreakerBehavior;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use metrics::CircuitBreakerMetrics;
