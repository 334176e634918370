use serde_json::Value;
use uuid::Uuid;

/// A registered, versioned task definition (§3). Unique on
/// `(task_namespace_uuid, name, version)`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NamedTask {
    pub named_task_uuid: Uuid,
    pub task_namespace_uuid: Uuid,
    pub name: String,
    pub version: String,
    pub configuration: Option<Value>,
}
