use uuid::Uuid;

/// Groups `NamedTask`s so multiple tenants/teams can share step names
/// without colliding (§3).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskNamespace {
    pub task_namespace_uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
}
