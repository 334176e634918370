//! Integration tests for the task/step transition engine against a real,
//! migrated Postgres instance (§4.6).

use sqlx::PgPool;
use uuid::Uuid;

use tasker_shared::state_machine::{StepEvent, StepStateMachine, TaskEvent, TaskState, TaskStateMachine, WorkflowStepState};

async fn seed_task(pool: &PgPool) -> Uuid {
    let namespace_uuid = Uuid::now_v7();
    sqlx::query("INSERT INTO task_namespaces (task_namespace_uuid, name) VALUES ($1, 'default')")
        .bind(namespace_uuid)
        .execute(pool)
        .await
        .unwrap();

    let named_task_uuid = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO named_tasks (named_task_uuid, task_namespace_uuid, name, version) \
         VALUES ($1, $2, 'checkout', '1.0.0')",
    )
    .bind(named_task_uuid)
    .bind(namespace_uuid)
    .execute(pool)
    .await
    .unwrap();

    let task_uuid = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO tasks (task_uuid, named_task_uuid, identity_hash) VALUES ($1, $2, $3)",
    )
    .bind(task_uuid)
    .bind(named_task_uuid)
    .bind(task_uuid.to_string())
    .execute(pool)
    .await
    .unwrap();

    task_uuid
}

async fn seed_step(pool: &PgPool, task_uuid: Uuid) -> Uuid {
    let dependent_system_uuid = Uuid::now_v7();
    sqlx::query("INSERT INTO dependent_systems (dependent_system_uuid, name) VALUES ($1, 'default')")
        .bind(dependent_system_uuid)
        .execute(pool)
        .await
        .unwrap();

    let named_step_uuid = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO named_steps (named_step_uuid, dependent_system_uuid, name) VALUES ($1, $2, 'charge_card')",
    )
    .bind(named_step_uuid)
    .bind(dependent_system_uuid)
    .execute(pool)
    .await
    .unwrap();

    let step_uuid = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO workflow_steps (workflow_step_uuid, task_uuid, named_step_uuid) VALUES ($1, $2, $3)",
    )
    .bind(step_uuid)
    .bind(task_uuid)
    .bind(named_step_uuid)
    .execute(pool)
    .await
    .unwrap();

    step_uuid
}

#[sqlx::test(migrator = "tasker_shared::database::migrator::MIGRATOR")]
async fn fresh_task_defaults_to_pending(pool: PgPool) {
    let task_uuid = seed_task(&pool).await;
    let machine = TaskStateMachine::for_task(task_uuid, pool, Uuid::now_v7());
    assert_eq!(machine.current_state().await.unwrap(), TaskState::Pending);
}

#[sqlx::test(migrator = "tasker_shared::database::migrator::MIGRATOR")]
async fn task_transitions_pending_to_in_progress_to_complete(pool: PgPool) {
    let task_uuid = seed_task(&pool).await;
    let machine = TaskStateMachine::for_task(task_uuid, pool, Uuid::now_v7());

    machine.transition(TaskEvent::Start).await.unwrap();
    assert_eq!(machine.current_state().await.unwrap(), TaskState::InProgress);

    machine.transition(TaskEvent::AllStepsComplete).await.unwrap();
    assert_eq!(machine.current_state().await.unwrap(), TaskState::Complete);
}

#[sqlx::test(migrator = "tasker_shared::database::migrator::MIGRATOR")]
async fn illegal_task_transition_is_rejected(pool: PgPool) {
    let task_uuid = seed_task(&pool).await;
    let machine = TaskStateMachine::for_task(task_uuid, pool, Uuid::now_v7());

    let result = machine.transition(TaskEvent::AllStepsComplete).await;
    assert!(result.is_err(), "pending -> complete should be illegal");
}

#[sqlx::test(migrator = "tasker_shared::database::migrator::MIGRATOR")]
async fn error_task_can_reenter_in_progress_via_reenqueue(pool: PgPool) {
    let task_uuid = seed_task(&pool).await;
    let machine = TaskStateMachine::for_task(task_uuid, pool, Uuid::now_v7());

    machine.transition(TaskEvent::Start).await.unwrap();
    machine
        .transition(TaskEvent::BlockedByFailures {
            reason: "step exhausted retries".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(machine.current_state().await.unwrap(), TaskState::Error);

    machine.transition(TaskEvent::Reenqueue).await.unwrap();
    assert_eq!(machine.current_state().await.unwrap(), TaskState::InProgress);
}

#[sqlx::test(migrator = "tasker_shared::database::migrator::MIGRATOR")]
async fn only_one_transition_row_is_most_recent_at_a_time(pool: PgPool) {
    let task_uuid = seed_task(&pool).await;
    let machine = TaskStateMachine::for_task(task_uuid, pool.clone(), Uuid::now_v7());

    machine.transition(TaskEvent::Start).await.unwrap();
    machine.transition(TaskEvent::AllStepsComplete).await.unwrap();

    let (most_recent_count,): (i64,) = sqlx::query_as(
        "SELECT count(*) FROM task_transitions WHERE entity_uuid = $1 AND most_recent = true",
    )
    .bind(task_uuid)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(most_recent_count, 1);

    let (total_count,): (i64,) =
        sqlx::query_as("SELECT count(*) FROM task_transitions WHERE entity_uuid = $1")
            .bind(task_uuid)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(total_count, 2);
}

#[sqlx::test(migrator = "tasker_shared::database::migrator::MIGRATOR")]
async fn step_retry_reset_moves_error_back_to_pending(pool: PgPool) {
    let task_uuid = seed_task(&pool).await;
    let step_uuid = seed_step(&pool, task_uuid).await;
    let machine = StepStateMachine::for_step(step_uuid, pool, Uuid::now_v7());

    machine.transition(StepEvent::Start).await.unwrap();
    machine
        .transition(StepEvent::Fail {
            message: "timeout".to_string(),
            retryable: true,
            backoff_request_seconds: None,
            terminal: false,
        })
        .await
        .unwrap();
    assert_eq!(machine.current_state().await.unwrap(), WorkflowStepState::Error);

    machine.transition(StepEvent::ResetForRetry).await.unwrap();
    assert_eq!(machine.current_state().await.unwrap(), WorkflowStepState::Pending);
}

#[sqlx::test(migrator = "tasker_shared::database::migrator::MIGRATOR")]
async fn redelivered_completion_is_idempotent_no_op(pool: PgPool) {
    let task_uuid = seed_task(&pool).await;
    let step_uuid = seed_step(&pool, task_uuid).await;
    let machine = StepStateMachine::for_step(step_uuid, pool.clone(), Uuid::now_v7());

    machine.transition(StepEvent::Start).await.unwrap();
    machine
        .transition(StepEvent::Complete { results: None })
        .await
        .unwrap();

    // Redelivery of the same completion message must not error or insert a
    // second transition row (§8 property 7, at-most-once effective application).
    machine
        .transition(StepEvent::Complete { results: None })
        .await
        .unwrap();

    let (total_count,): (i64,) =
        sqlx::query_as("SELECT count(*) FROM workflow_step_transitions WHERE entity_uuid = $1")
            .bind(step_uuid)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(total_count, 2);
}
