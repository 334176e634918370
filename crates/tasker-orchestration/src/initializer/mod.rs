//! Task submission ingestion (§6 "Task submission (consumed)"): turns a
//! structured task request into a materialized `Task` plus its `WorkflowStep`s
//! and edges, drawn from a registered `TaskTemplate`'s step DAG.

use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

use tasker_shared::event_bus::{Event, EventBus};
use tasker_shared::registry::HandlerRegistry;
use tasker_shared::{OrchestrationError, OrchestrationResult, SystemContext};

/// A structured task request as it arrives at the boundary of the core (§6).
/// How it actually arrives (HTTP, queue message, CLI) is out of scope here.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub context: Option<Value>,
    pub initiator: Option<String>,
    pub reason: Option<String>,
    pub source_system: Option<String>,
    pub tags: Option<Value>,
}

/// Materializes task templates into concrete, runnable task rows (§2 dataflow:
/// "the coordinator materializes a Task and its WorkflowSteps from a
/// NamedTask's step templates").
#[derive(Debug, Clone)]
pub struct TaskInitializer {
    pool: PgPool,
    event_bus: EventBus,
    registry: Arc<HandlerRegistry>,
}

impl TaskInitializer {
    pub fn new(context: &SystemContext) -> Self {
        Self {
            pool: context.pool.clone(),
            event_bus: context.event_bus.clone(),
            registry: Arc::clone(&context.registry),
        }
    }

    /// Looks up the request's `(namespace, name, version)` in the registry,
    /// then materializes the task row, its steps, and their edges in one
    /// transaction. Resubmitting an identical request (same `identity_hash`)
    /// returns the already-materialized task's id instead of erroring, since
    /// `identity_hash` exists precisely to make submission idempotent.
    #[instrument(skip(self, request), fields(namespace = %request.namespace, name = %request.name))]
    pub async fn initialize(&self, request: TaskRequest) -> OrchestrationResult<Uuid> {
        let template = self
            .registry
            .lookup(&request.namespace, &request.name, &request.version)?;

        let identity_hash = compute_identity_hash(&request);

        let mut tx = self.pool.begin().await?;

        if let Some(existing) = find_task_by_identity_hash(&mut tx, &identity_hash).await? {
            tx.commit().await?;
            info!(task_uuid = %existing, %identity_hash, "task request deduplicated against existing task");
            return Ok(existing);
        }

        let namespace_uuid = find_or_create_namespace(&mut tx, &request.namespace).await?;
        let named_task_uuid =
            find_or_create_named_task(&mut tx, namespace_uuid, &request.name, &request.version).await?;
        let dependent_system_uuid = find_or_create_dependent_system(&mut tx, "default").await?;

        let task_uuid: Uuid = sqlx::query_scalar(
            "INSERT INTO tasks (named_task_uuid, context, identity_hash, initiator, reason, \
             source_system, tags) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING task_uuid",
        )
        .bind(named_task_uuid)
        .bind(&request.context)
        .bind(&identity_hash)
        .bind(&request.initiator)
        .bind(&request.reason)
        .bind(&request.source_system)
        .bind(&request.tags)
        .fetch_one(&mut *tx)
        .await?;

        let mut step_uuids = std::collections::HashMap::new();
        for step in &template.steps {
            let named_step_uuid =
                find_or_create_named_step(&mut tx, dependent_system_uuid, &step.named_step).await?;
            sqlx::query(
                "INSERT INTO named_task_steps (named_task_uuid, named_step_uuid, skippable, \
                 default_retryable, default_retry_limit) VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (named_task_uuid, named_step_uuid) DO UPDATE SET \
                 skippable = excluded.skippable, default_retryable = excluded.default_retryable, \
                 default_retry_limit = excluded.default_retry_limit",
            )
            .bind(named_task_uuid)
            .bind(named_step_uuid)
            .bind(step.skippable)
            .bind(step.default_retryable)
            .bind(step.default_retry_limit)
            .execute(&mut *tx)
            .await?;

            let workflow_step_uuid: Uuid = sqlx::query_scalar(
                "INSERT INTO workflow_steps (task_uuid, named_step_uuid, retryable, retry_limit, skippable) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING workflow_step_uuid",
            )
            .bind(task_uuid)
            .bind(named_step_uuid)
            .bind(step.default_retryable)
            .bind(step.default_retry_limit)
            .bind(step.skippable)
            .fetch_one(&mut *tx)
            .await?;

            step_uuids.insert(step.named_step.clone(), workflow_step_uuid);
        }

        for step in &template.steps {
            let to_uuid = step_uuids[&step.named_step];
            for dep in &step.dependencies {
                let from_uuid = step_uuids[dep];
                sqlx::query(
                    "INSERT INTO workflow_step_edges (from_step_uuid, to_step_uuid, name) VALUES ($1, $2, $3)",
                )
                .bind(from_uuid)
                .bind(to_uuid)
                .bind(dep)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        self.event_bus
            .publish(Event::TaskInitializeRequested { task_uuid })
            .await;

        info!(task_uuid = %task_uuid, steps = template.steps.len(), "task materialized from template");
        Ok(task_uuid)
    }
}

/// Deduplicates on `{namespace, name, version, context}`: resubmitting the
/// same logical request returns the same hash regardless of the unrelated
/// `initiator`/`reason`/`tags` metadata carried along for audit purposes.
fn compute_identity_hash(request: &TaskRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.namespace.as_bytes());
    hasher.update([0u8]);
    hasher.update(request.name.as_bytes());
    hasher.update([0u8]);
    hasher.update(request.version.as_bytes());
    hasher.update([0u8]);
    if let Some(context) = &request.context {
        hasher.update(context.to_string().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

async fn find_task_by_identity_hash(
    tx: &mut Transaction<'_, Postgres>,
    identity_hash: &str,
) -> OrchestrationResult<Option<Uuid>> {
    let found: Option<Uuid> =
        sqlx::query_scalar("SELECT task_uuid FROM tasks WHERE identity_hash = $1")
            .bind(identity_hash)
            .fetch_optional(&mut **tx)
            .await?;
    Ok(found)
}

async fn find_or_create_namespace(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
) -> OrchestrationResult<Uuid> {
    let uuid: Uuid = sqlx::query_scalar(
        "INSERT INTO task_namespaces (name) VALUES ($1) \
         ON CONFLICT (name) DO UPDATE SET name = excluded.name RETURNING task_namespace_uuid",
    )
    .bind(name)
    .fetch_one(&mut **tx)
    .await
    .map_err(OrchestrationError::from)?;
    Ok(uuid)
}

async fn find_or_create_dependent_system(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
) -> OrchestrationResult<Uuid> {
    let uuid: Uuid = sqlx::query_scalar(
        "INSERT INTO dependent_systems (name) VALUES ($1) \
         ON CONFLICT (name) DO UPDATE SET name = excluded.name RETURNING dependent_system_uuid",
    )
    .bind(name)
    .fetch_one(&mut **tx)
    .await?;
    Ok(uuid)
}

async fn find_or_create_named_task(
    tx: &mut Transaction<'_, Postgres>,
    namespace_uuid: Uuid,
    name: &str,
    version: &str,
) -> OrchestrationResult<Uuid> {
    let uuid: Uuid = sqlx::query_scalar(
        "INSERT INTO named_tasks (task_namespace_uuid, name, version) VALUES ($1, $2, $3) \
         ON CONFLICT (task_namespace_uuid, name, version) DO UPDATE SET name = excluded.name \
         RETURNING named_task_uuid",
    )
    .bind(namespace_uuid)
    .bind(name)
    .bind(version)
    .fetch_one(&mut **tx)
    .await?;
    Ok(uuid)
}

/// `named_steps` carries no uniqueness constraint of its own (a step name may
/// legitimately repeat across dependent systems with different meanings), so
/// this looks up by `(dependent_system_uuid, name)` before inserting rather
/// than relying on `ON CONFLICT`.
async fn find_or_create_named_step(
    tx: &mut Transaction<'_, Postgres>,
    dependent_system_uuid: Uuid,
    name: &str,
) -> OrchestrationResult<Uuid> {
    let existing: Option<Uuid> = sqlx::query_scalar(
        "SELECT named_step_uuid FROM named_steps WHERE dependent_system_uuid = $1 AND name = $2",
    )
    .bind(dependent_system_uuid)
    .bind(name)
    .fetch_optional(&mut **tx)
    .await?;
    if let Some(uuid) = existing {
        return Ok(uuid);
    }

    let uuid: Uuid = sqlx::query_scalar(
        "INSERT INTO named_steps (dependent_system_uuid, name) VALUES ($1, $2) RETURNING named_step_uuid",
    )
    .bind(dependent_system_uuid)
    .bind(name)
    .fetch_one(&mut **tx)
    .await?;
    Ok(uuid)
}
