use uuid::Uuid;

/// One DAG edge of a concrete task's step graph (§3). Invariants (acyclic, no
/// self-edges, no duplicate pairs) are enforced at template-registration time
/// (§4.7) and re-validated whenever a task's steps are materialized.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkflowStepEdge {
    pub from_step_uuid: Uuid,
    pub to_step_uuid: Uuid,
    pub name: String,
}
