//! The readiness evaluator's single store round-trip (§4.1).
//!
//! One query joins step rows, edge rows, and each step's current transition;
//! the readiness predicate itself is computed afterward in pure application
//! code over the returned rows, so it can be unit-tested without a database
//! (see `tasker_shared::models::orchestration::StepReadinessStatus`).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use tasker_shared::backoff::next_retry_at;
use tasker_shared::config::BackoffConfig;
use tasker_shared::models::orchestration::{StepReadinessStatus, TaskExecutionContext};
use tasker_shared::state_machine::WorkflowStepState;
use tasker_shared::{OrchestrationError, OrchestrationResult};

#[derive(sqlx::FromRow)]
struct StepReadinessRow {
    workflow_step_uuid: Uuid,
    name: String,
    current_state: Option<String>,
    total_parents: i64,
    completed_parents: i64,
    attempts: i32,
    retry_limit: i32,
    retryable: bool,
    in_process: bool,
    processed: bool,
    skippable: bool,
    blocked_parents: i64,
    last_failure_at: Option<DateTime<Utc>>,
    backoff_request_seconds: Option<f64>,
}

const READINESS_QUERY: &str = r#"
SELECT
    ws.workflow_step_uuid,
    ns.name,
    wst.to_state AS current_state,
    COALESCE(parent_counts.total_parents, 0) AS total_parents,
    COALESCE(parent_counts.completed_parents, 0) AS completed_parents,
    ws.attempts,
    ws.retry_limit,
    ws.retryable,
    ws.in_process,
    ws.processed,
    ws.skippable,
    COALESCE(parent_counts.blocked_parents, 0) AS blocked_parents,
    failure.last_failure_at,
    ws.backoff_request_seconds
FROM workflow_steps ws
JOIN named_steps ns ON ns.named_step_uuid = ws.named_step_uuid
LEFT JOIN workflow_step_transitions wst
    ON wst.entity_uuid = ws.workflow_step_uuid AND wst.most_recent = true
LEFT JOIN LATERAL (
    SELECT
        count(*) AS total_parents,
        count(*) FILTER (
            WHERE parent_state.to_state IN ('complete', 'resolved_manually')
        ) AS completed_parents,
        count(*) FILTER (
            WHERE parent_state.to_state = 'cancelled'
                OR (
                    parent_state.to_state = 'error'
                    AND (NOT parent_ws.retryable OR parent_ws.attempts >= parent_ws.retry_limit)
                )
        ) AS blocked_parents
    FROM workflow_step_edges edge
    JOIN workflow_steps parent_ws ON parent_ws.workflow_step_uuid = edge.from_step_uuid
    LEFT JOIN workflow_step_transitions parent_state
        ON parent_state.entity_uuid = edge.from_step_uuid AND parent_state.most_recent = true
    WHERE edge.to_step_uuid = ws.workflow_step_uuid
) parent_counts ON true
LEFT JOIN LATERAL (
    SELECT created_at AS last_failure_at
    FROM workflow_step_transitions t
    WHERE t.entity_uuid = ws.workflow_step_uuid AND t.to_state = 'error'
    ORDER BY t.sort_key DESC
    LIMIT 1
) failure ON true
WHERE ws.task_uuid = $1
"#;

/// Fetches every step readiness fact for one task in a single round trip,
/// then computes the derived predicates in application code.
pub async fn fetch_step_readiness(
    pool: &PgPool,
    task_uuid: Uuid,
    backoff_config: &BackoffConfig,
    jitter: f64,
) -> OrchestrationResult<Vec<StepReadinessStatus>> {
    let rows: Vec<StepReadinessRow> = sqlx::query_as(READINESS_QUERY)
        .bind(task_uuid)
        .fetch_all(pool)
        .await
        .map_err(|e| OrchestrationError::ReadinessEvaluationFailed {
            task_uuid,
            reason: e.to_string(),
        })?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let current_state = row
                .current_state
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(WorkflowStepState::Pending);

            let next_retry_at = row.last_failure_at.map(|at| {
                next_retry_at(
                    at,
                    row.attempts as u32,
                    row.backoff_request_seconds,
                    backoff_config,
                    jitter,
                )
            });

            StepReadinessStatus {
                step_uuid: row.workflow_step_uuid,
                name: row.name,
                current_state,
                total_parents: row.total_parents,
                completed_parents: row.completed_parents,
                attempts: row.attempts,
                retry_limit: row.retry_limit,
                retryable: row.retryable,
                in_process: row.in_process,
                processed: row.processed,
                skippable: row.skippable,
                blocked_parents: row.blocked_parents,
                last_failure_at: row.last_failure_at,
                next_retry_at,
            }
        })
        .collect())
}

/// Aggregates per-step statuses into the task-level classification (§4.1).
/// Skippable steps are excluded from the "all complete" denominator's
/// numerator/denominator pairing in the caller's non-skippable counts.
pub fn aggregate_execution_context(
    task_uuid: Uuid,
    statuses: &[StepReadinessStatus],
    now: DateTime<Utc>,
) -> TaskExecutionContext {
    let total_steps = statuses.len() as i64;
    let pending_steps = statuses
        .iter()
        .filter(|s| s.current_state == WorkflowStepState::Pending)
        .count() as i64;
    let in_progress_steps = statuses
        .iter()
        .filter(|s| s.current_state == WorkflowStepState::InProgress)
        .count() as i64;
    let completed_steps = statuses
        .iter()
        .filter(|s| {
            matches!(
                s.current_state,
                WorkflowStepState::Complete | WorkflowStepState::ResolvedManually
            )
        })
        .count() as i64;
    let failed_steps = statuses
        .iter()
        .filter(|s| s.current_state == WorkflowStepState::Error && !s.retry_eligible())
        .count() as i64;
    let ready_steps = statuses
        .iter()
        .filter(|s| s.ready_for_execution(now))
        .count() as i64;

    let non_skippable_total = statuses.iter().filter(|s| !s.skippable).count() as i64;
    let non_skippable_completed = statuses
        .iter()
        .filter(|s| {
            !s.skippable
                && matches!(
                    s.current_state,
                    WorkflowStepState::Complete | WorkflowStepState::ResolvedManually
                )
        })
        .count() as i64;

    // Only steps still sitting in `error` and waiting out their backoff are
    // relevant to when the task should wake up next; a step that's already
    // ready or in progress needs no delay.
    let next_wakeup_at = statuses
        .iter()
        .filter(|s| s.current_state == WorkflowStepState::Error && s.retry_eligible())
        .filter_map(|s| s.next_retry_at)
        .min();

    TaskExecutionContext::classify(
        task_uuid,
        total_steps,
        pending_steps,
        in_progress_steps,
        completed_steps,
        failed_steps,
        ready_steps,
        non_skippable_total,
        non_skippable_completed,
        next_wakeup_at,
    )
}
