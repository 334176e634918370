//! Durable hand-off back onto the work queue (§2 component 6, §4.5).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use tasker_shared::config::ReenqueueConfig;
use tasker_shared::{OrchestrationError, OrchestrationResult};

/// Strategy for placing a task back onto the work queue. Production code uses
/// [`ProductionReenqueuer`] against the real table; deterministic tests use
/// [`SynchronousReenqueuer`] to drive the coordinator inline (§2 component 13).
#[async_trait]
pub trait Reenqueuer: Send + Sync + std::fmt::Debug {
    async fn reenqueue(
        &self,
        task_uuid: Uuid,
        reason: &str,
        visible_at: DateTime<Utc>,
    ) -> OrchestrationResult<()>;
}

/// Writes a `WorkQueueEntry`, debounced per `(task_uuid, reason)` within
/// `debounce_ms` (§4.5) to avoid flooding the queue when several steps of the
/// same task fail in close succession.
#[derive(Debug)]
pub struct ProductionReenqueuer {
    pool: PgPool,
    config: ReenqueueConfig,
    last_enqueued: Mutex<std::collections::HashMap<(Uuid, String), DateTime<Utc>>>,
}

impl ProductionReenqueuer {
    pub fn new(pool: PgPool, config: ReenqueueConfig) -> Self {
        Self {
            pool,
            config,
            last_enqueued: Mutex::new(std::collections::HashMap::new()),
        }
    }
}

#[async_trait]
impl Reenqueuer for ProductionReenqueuer {
    async fn reenqueue(
        &self,
        task_uuid: Uuid,
        reason: &str,
        visible_at: DateTime<Utc>,
    ) -> OrchestrationResult<()> {
        let dedup_key = (task_uuid, reason.to_string());
        {
            let mut last = self.last_enqueued.lock().await;
            if let Some(previous) = last.get(&dedup_key) {
                let since = Utc::now().signed_duration_since(*previous);
                if since.num_milliseconds() < self.config.debounce_ms as i64 {
                    return Ok(());
                }
            }
            last.insert(dedup_key, Utc::now());
        }

        sqlx::query(
            "INSERT INTO work_queue_entries (task_uuid, reason, visible_at) VALUES ($1, $2, $3)",
        )
        .bind(task_uuid)
        .bind(reason)
        .bind(visible_at)
        .execute(&self.pool)
        .await
        .map_err(|e| OrchestrationError::ReenqueueFailed {
            task_uuid,
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

/// Test double that records reenqueue requests instead of writing to the
/// store, so scenario tests can drive the coordinator's next pass
/// deterministically without sleeping for real delays (§2 component 13).
#[derive(Debug, Default)]
pub struct SynchronousReenqueuer {
    pub requests: Mutex<Vec<(Uuid, String, DateTime<Utc>)>>,
}

impl SynchronousReenqueuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn drain(&self) -> Vec<(Uuid, String, DateTime<Utc>)> {
        std::mem::take(&mut *self.requests.lock().await)
    }
}

#[async_trait]
impl Reenqueuer for SynchronousReenqueuer {
    async fn reenqueue(
        &self,
        task_uuid: Uuid,
        reason: &str,
        visible_at: DateTime<Utc>,
    ) -> OrchestrationResult<()> {
        self.requests
            .lock()
            .await
            .push((task_uuid, reason.to_string(), visible_at));
        Ok(())
    }
}

/// Computes the next wake-up time for a task: the earliest `next_retry_at`
/// across its steps, or "now" if nothing is backed off (§4.5, §4.2).
pub fn earliest_wakeup(next_retry_ats: impl IntoIterator<Item = DateTime<Utc>>) -> DateTime<Utc> {
    next_retry_ats.into_iter().min().unwrap_or_else(Utc::now)
}
