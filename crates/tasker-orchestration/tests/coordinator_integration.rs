//! End-to-end coordinator scenarios against a real, migrated Postgres: a
//! diamond DAG (`start -> {left, right} -> finish`) driven through readiness
//! evaluation, batch execution, and finalization (§8 scenarios S1/S3/S4).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use tasker_shared::config::TaskerConfig;
use tasker_shared::event_bus::EventBus;
use tasker_shared::models::core::{Task, WorkflowStep};
use tasker_shared::registry::{StepHandler, StepHandlerOutcome};

use tasker_orchestration::{ReadinessEvaluator, Reenqueuer, StepExecutor, SynchronousReenqueuer, TaskCoordinator, TaskFinalizer};

#[derive(Debug)]
struct AlwaysSucceeds;

#[async_trait]
impl StepHandler for AlwaysSucceeds {
    async fn process(&self, _task: &Task, _sequence: &[WorkflowStep], _step: &WorkflowStep) -> StepHandlerOutcome {
        StepHandlerOutcome::Success(None)
    }
}

#[derive(Debug)]
struct AlwaysFailsTerminally;

#[async_trait]
impl StepHandler for AlwaysFailsTerminally {
    async fn process(&self, _task: &Task, _sequence: &[WorkflowStep], _step: &WorkflowStep) -> StepHandlerOutcome {
        StepHandlerOutcome::permanent_failure("vendor rejected the charge")
    }
}

#[derive(Debug)]
struct AlwaysFailsRetryably;

#[async_trait]
impl StepHandler for AlwaysFailsRetryably {
    async fn process(&self, _task: &Task, _sequence: &[WorkflowStep], _step: &WorkflowStep) -> StepHandlerOutcome {
        StepHandlerOutcome::retryable_failure("vendor timed out")
    }
}

#[derive(Debug, Default)]
struct CountingHandler {
    calls: AtomicUsize,
}

#[async_trait]
impl StepHandler for CountingHandler {
    async fn process(&self, _task: &Task, _sequence: &[WorkflowStep], _step: &WorkflowStep) -> StepHandlerOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StepHandlerOutcome::Success(None)
    }
}

struct Fixture {
    task_uuid: Uuid,
    step_uuids: HashMap<&'static str, Uuid>,
}

/// Seeds a diamond DAG: `start -> {left, right} -> finish`.
async fn seed_diamond(pool: &PgPool) -> Fixture {
    let namespace_uuid = Uuid::now_v7();
    sqlx::query("INSERT INTO task_namespaces (task_namespace_uuid, name) VALUES ($1, 'default')")
        .bind(namespace_uuid)
        .execute(pool)
        .await
        .unwrap();

    let named_task_uuid = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO named_tasks (named_task_uuid, task_namespace_uuid, name, version) VALUES ($1, $2, 'order_fulfillment', '1.0.0')",
    )
    .bind(named_task_uuid)
    .bind(namespace_uuid)
    .execute(pool)
    .await
    .unwrap();

    let task_uuid = Uuid::now_v7();
    sqlx::query("INSERT INTO tasks (task_uuid, named_task_uuid, identity_hash) VALUES ($1, $2, $3)")
        .bind(task_uuid)
        .bind(named_task_uuid)
        .bind(task_uuid.to_string())
        .execute(pool)
        .await
        .unwrap();

    let dependent_system_uuid = Uuid::now_v7();
    sqlx::query("INSERT INTO dependent_systems (dependent_system_uuid, name) VALUES ($1, 'default')")
        .bind(dependent_system_uuid)
        .execute(pool)
        .await
        .unwrap();

    let mut step_uuids = HashMap::new();
    for name in ["start", "left", "right", "finish"] {
        let named_step_uuid = Uuid::now_v7();
        sqlx::query("INSERT INTO named_steps (named_step_uuid, dependent_system_uuid, name) VALUES ($1, $2, $3)")
            .bind(named_step_uuid)
            .bind(dependent_system_uuid)
            .bind(name)
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

        step_uuids.insert(name, step_uuid);
    }

    for (from, to) in [("start", "left"), ("start", "right"), ("left", "finish"), ("right", "finish")] {
        sqlx::query("INSERT INTO workflow_step_edges (from_step_uuid, to_step_uuid, name) VALUES ($1, $2, $3)")
            .bind(step_uuids[from])
            .bind(step_uuids[to])
            .bind(format!("{from}_to_{to}"))
            .execute(pool)
            .await
            .unwrap();
    }

    Fixture { task_uuid, step_uuids }
}

fn handler_map(
    step_uuids: &HashMap<&'static str, Uuid>,
    handlers: HashMap<&'static str, Arc<dyn StepHandler>>,
) -> HashMap<Uuid, Arc<dyn StepHandler>> {
    step_uuids
        .iter()
        .filter_map(|(name, uuid)| handlers.get(name).map(|h| (*uuid, Arc::clone(h))))
        .collect()
}

fn coordinator(pool: PgPool, reenqueuer: Arc<dyn Reenqueuer>) -> TaskCoordinator {
    let config = TaskerConfig::default();
    let context = tasker_shared::SystemContext::with_pool(pool.clone(), config)
        .with_registry(Arc::new(tasker_shared::registry::HandlerRegistry::new()));

    // Build every stage off the same context's event bus/processor identity
    // rather than standalone ones, so a subscriber on `context.event_bus`
    // observes every event the pass publishes (including the coordinator's
    // own `task_started`).
    let readiness = ReadinessEvaluator::new(pool.clone(), config);
    let executor = StepExecutor::new(pool.clone(), context.event_bus.clone(), context.processor_uuid, 10, None);
    let finalizer = TaskFinalizer::new(pool, context.event_bus.clone(), context.processor_uuid, reenqueuer);

    TaskCoordinator::new(&context, readiness, executor, finalizer)
}

#[sqlx::test(migrator = "tasker_shared::database::migrator::MIGRATOR")]
async fn diamond_dag_runs_to_completion_across_passes(pool: PgPool) {
    let fixture = seed_diamond(&pool).await;
    let mut handlers: HashMap<&'static str, Arc<dyn StepHandler>> = HashMap::new();
    handlers.insert("start", Arc::new(AlwaysSucceeds));
    handlers.insert("left", Arc::new(AlwaysSucceeds));
    handlers.insert("right", Arc::new(AlwaysSucceeds));
    handlers.insert("finish", Arc::new(AlwaysSucceeds));
    let by_uuid = handler_map(&fixture.step_uuids, handlers);

    let named_lookup: HashMap<Uuid, &'static str> =
        fixture.step_uuids.iter().map(|(name, uuid)| (*uuid, *name)).collect();

    let reenqueuer = Arc::new(SynchronousReenqueuer::new());
    let coordinator = coordinator(pool.clone(), reenqueuer.clone());

    // start -> {left, right} -> finish needs at least two passes: one that
    // executes `start`, one that executes `left`+`right`, and a final one
    // that executes `finish` and completes the task. Drive it until the
    // finalizer stops reenqueuing.
    for _ in 0..6 {
        let result = coordinator
            .run_pass(fixture.task_uuid, |name| {
                let uuid = named_lookup.iter().find(|(_, n)| **n == name).map(|(u, _)| *u);
                uuid.and_then(|u| by_uuid.get(&u).cloned())
            })
            .await
            .unwrap()
            .expect("advisory lock always available in a single-threaded test");

        if result.finalization.action == tasker_orchestration::FinalizationAction::Completed {
            break;
        }
        reenqueuer.drain().await;
    }

    let (complete,): (bool,) = sqlx::query_as("SELECT complete FROM tasks WHERE task_uuid = $1")
        .bind(fixture.task_uuid)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(complete, "diamond dag should reach completion");

    let (processed_count,): (i64,) =
        sqlx::query_as("SELECT count(*) FROM workflow_steps WHERE task_uuid = $1 AND processed = true")
            .bind(fixture.task_uuid)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(processed_count, 4);
}

#[sqlx::test(migrator = "tasker_shared::database::migrator::MIGRATOR")]
async fn terminal_failure_blocks_the_task_instead_of_completing(pool: PgPool) {
    let fixture = seed_diamond(&pool).await;
    let mut handlers: HashMap<&'static str, Arc<dyn StepHandler>> = HashMap::new();
    handlers.insert("start", Arc::new(AlwaysSucceeds));
    handlers.insert("left", Arc::new(AlwaysFailsTerminally));
    handlers.insert("right", Arc::new(AlwaysSucceeds));
    handlers.insert("finish", Arc::new(AlwaysSucceeds));
    let by_uuid = handler_map(&fixture.step_uuids, handlers);
    let named_lookup: HashMap<Uuid, &'static str> =
        fixture.step_uuids.iter().map(|(name, uuid)| (*uuid, *name)).collect();

    // retry_limit defaults to 0 in the bare fixture row, so a retryable=false
    // failure on `left` is immediately terminal.
    let reenqueuer = Arc::new(SynchronousReenqueuer::new());
    let coordinator = coordinator(pool.clone(), reenqueuer.clone());

    let mut last_action = None;
    for _ in 0..6 {
        let result = coordinator
            .run_pass(fixture.task_uuid, |name| {
                let uuid = named_lookup.iter().find(|(_, n)| **n == name).map(|(u, _)| *u);
                uuid.and_then(|u| by_uuid.get(&u).cloned())
            })
            .await
            .unwrap()
            .unwrap();
        last_action = Some(result.finalization.action);
        if result.finalization.action == tasker_orchestration::FinalizationAction::Failed {
            break;
        }
        reenqueuer.drain().await;
    }

    assert_eq!(last_action, Some(tasker_orchestration::FinalizationAction::Failed));

    let (state,): (Option<String>,) = sqlx::query_as(
        "SELECT to_state FROM task_transitions WHERE entity_uuid = $1 AND most_recent = true",
    )
    .bind(fixture.task_uuid)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(state.as_deref(), Some("error"));
}

#[sqlx::test(migrator = "tasker_shared::database::migrator::MIGRATOR")]
async fn concurrent_sibling_steps_each_run_exactly_once(pool: PgPool) {
    let fixture = seed_diamond(&pool).await;
    let counting = Arc::new(CountingHandler::default());
    let mut handlers: HashMap<&'static str, Arc<dyn StepHandler>> = HashMap::new();
    handlers.insert("start", Arc::new(AlwaysSucceeds));
    handlers.insert("left", counting.clone());
    handlers.insert("right", counting.clone());
    handlers.insert("finish", Arc::new(AlwaysSucceeds));
    let by_uuid = handler_map(&fixture.step_uuids, handlers);
    let named_lookup: HashMap<Uuid, &'static str> =
        fixture.step_uuids.iter().map(|(name, uuid)| (*uuid, *name)).collect();

    let reenqueuer = Arc::new(SynchronousReenqueuer::new());
    let coordinator = coordinator(pool.clone(), reenqueuer.clone());

    for _ in 0..6 {
        let result = coordinator
            .run_pass(fixture.task_uuid, |name| {
                let uuid = named_lookup.iter().find(|(_, n)| **n == name).map(|(u, _)| *u);
                uuid.and_then(|u| by_uuid.get(&u).cloned())
            })
            .await
            .unwrap()
            .unwrap();
        if result.finalization.action == tasker_orchestration::FinalizationAction::Completed {
            break;
        }
        reenqueuer.drain().await;
    }

    assert_eq!(counting.calls.load(Ordering::SeqCst), 2, "left and right each run exactly once");
}

#[sqlx::test(migrator = "tasker_shared::database::migrator::MIGRATOR")]
async fn waiting_on_backoff_reenqueues_with_a_future_visible_at(pool: PgPool) {
    let fixture = seed_diamond(&pool).await;
    let mut handlers: HashMap<&'static str, Arc<dyn StepHandler>> = HashMap::new();
    handlers.insert("start", Arc::new(AlwaysSucceeds));
    handlers.insert("left", Arc::new(AlwaysFailsRetryably));
    handlers.insert("right", Arc::new(AlwaysSucceeds));
    handlers.insert("finish", Arc::new(AlwaysSucceeds));
    let by_uuid = handler_map(&fixture.step_uuids, handlers);
    let named_lookup: HashMap<Uuid, &'static str> =
        fixture.step_uuids.iter().map(|(name, uuid)| (*uuid, *name)).collect();

    let reenqueuer = Arc::new(SynchronousReenqueuer::new());
    let coordinator = coordinator(pool.clone(), reenqueuer.clone());

    // First pass: `start` completes, `right` completes, `left` fails
    // retryably and lands in backoff. Nothing is immediately ready, so the
    // finalizer should schedule the next pass for `left`'s backoff window
    // rather than right away.
    let result = coordinator
        .run_pass(fixture.task_uuid, |name| {
            let uuid = named_lookup.iter().find(|(_, n)| **n == name).map(|(u, _)| *u);
            uuid.and_then(|u| by_uuid.get(&u).cloned())
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.finalization.action, tasker_orchestration::FinalizationAction::Reenqueued);

    let requests = reenqueuer.drain().await;
    let (_, reason, visible_at) = requests
        .iter()
        .find(|(task_uuid, _, _)| *task_uuid == fixture.task_uuid)
        .expect("a reenqueue request was recorded");
    assert_eq!(reason, "waiting_for_dependencies");
    assert!(
        *visible_at > chrono::Utc::now(),
        "visible_at should reflect left's backoff window instead of firing immediately"
    );
}
