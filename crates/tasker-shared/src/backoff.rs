//! Pure backoff math (§4.2). No I/O, no `sqlx`; unit-testable in isolation.

use crate::config::BackoffConfig;
use chrono::{DateTime, Utc};

/// Computes the delay (in seconds) before a step at attempt `n` (the attempt that
/// just failed, 1-indexed) may run again, given either a server-suggested backoff
/// or the exponential-with-full-jitter formula.
///
/// `rng` is injected so tests can pin the jitter factor; production callers pass
/// `fastrand::f64`.
pub fn backoff_delay_seconds(
    attempt: u32,
    backoff_request_seconds: Option<f64>,
    config: &BackoffConfig,
    jitter: f64,
) -> f64 {
    if let Some(requested) = backoff_request_seconds {
        return requested.max(0.0);
    }
    let exponent = attempt.saturating_sub(1);
    let exponential = config.base_seconds * 2f64.powi(exponent as i32);
    let capped = exponential.min(config.cap_seconds);
    // Full jitter: uniform in [0.5, 1.0] of the capped exponential delay.
    let jitter_factor = 0.5 + 0.5 * jitter.clamp(0.0, 1.0);
    capped * jitter_factor
}

/// The upper bound of the exponential formula before jitter is applied, used to
/// validate the "backoff floor" property (§8 property 8).
pub fn exponential_ceiling_seconds(attempt: u32, config: &BackoffConfig) -> f64 {
    let exponent = attempt.saturating_sub(1);
    (config.base_seconds * 2f64.powi(exponent as i32)).min(config.cap_seconds)
}

/// Computes `next_retry_at` for a step given its last failure timestamp.
pub fn next_retry_at(
    last_failure_at: DateTime<Utc>,
    attempt: u32,
    backoff_request_seconds: Option<f64>,
    config: &BackoffConfig,
    jitter: f64,
) -> DateTime<Utc> {
    let delay = backoff_delay_seconds(attempt, backoff_request_seconds, config, jitter);
    last_failure_at + chrono::Duration::milliseconds((delay * 1000.0).round() as i64)
}
