use uuid::Uuid;

/// A logical step identity shared across task versions (§3).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NamedStep {
    pub named_step_uuid: Uuid,
    pub dependent_system_uuid: Uuid,
    pub name: String,
}
