use chrono::NaiveDateTime;
use serde_json::Value;
use uuid::Uuid;

/// A concrete task run (§3). `identity_hash` deduplicates semantically
/// identical submissions; `correlation_id` threads through every log line and
/// event emitted while this task is processed.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Task {
    pub task_uuid: Uuid,
    pub named_task_uuid: Uuid,
    pub context: Option<Value>,
    pub identity_hash: String,
    pub requested_at: NaiveDateTime,
    pub initiator: Option<String>,
    pub reason: Option<String>,
    pub source_system: Option<String>,
    pub tags: Option<Value>,
    pub complete: bool,
    pub priority: i32,
    pub correlation_id: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
