//! Verifies the executor and finalizer publish the lifecycle events a
//! subscriber (metrics, audit log, webhook dispatcher) would depend on (§4.8).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use tasker_shared::config::TaskerConfig;
use tasker_shared::event_bus::{Event, EventBus, Subscriber};
use tasker_shared::models::core::{Task, WorkflowStep};
use tasker_shared::registry::{StepHandler, StepHandlerOutcome};

use tasker_orchestration::{ReadinessEvaluator, StepExecutor, SynchronousReenqueuer, TaskCoordinator, TaskFinalizer};

#[derive(Debug)]
struct Recorder(Mutex<Vec<&'static str>>);

#[async_trait]
impl Subscriber for Recorder {
    async fn on_event(&self, event: &Event) {
        self.0.lock().unwrap().push(event.name());
    }
}

#[derive(Debug)]
struct AlwaysSucceeds;

#[async_trait]
impl StepHandler for AlwaysSucceeds {
    async fn process(&self, _task: &Task, _sequence: &[WorkflowStep], _step: &WorkflowStep) -> StepHandlerOutcome {
        StepHandlerOutcome::Success(None)
    }
}

async fn seed_single_step_task(pool: &PgPool) -> (Uuid, Uuid) {
    let namespace_uuid = Uuid::now_v7();
    sqlx::query("INSERT INTO task_namespaces (task_namespace_uuid, name) VALUES ($1, 'default')")
        .bind(namespace_uuid)
        .execute(pool)
        .await
        .unwrap();
    let named_task_uuid = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO named_tasks (named_task_uuid, task_namespace_uuid, name, version) VALUES ($1, $2, 'checkout', '1.0.0')",
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
    let named_step_uuid = Uuid::now_v7();
    sqlx::query("INSERT INTO named_steps (named_step_uuid, dependent_system_uuid, name) VALUES ($1, $2, 'charge_card')")
        .bind(named_step_uuid)
        .bind(dependent_system_uuid)
        .execute(pool)
        .await
        .unwrap();
    let step_uuid = Uuid::now_v7();
    sqlx::query("INSERT INTO workflow_steps (workflow_step_uuid, task_uuid, named_step_uuid) VALUES ($1, $2, $3)")
        .bind(step_uuid)
        .bind(task_uuid)
        .bind(named_step_uuid)
        .execute(pool)
        .await
        .unwrap();
    (task_uuid, step_uuid)
}

#[sqlx::test(migrator = "tasker_shared::database::migrator::MIGRATOR")]
async fn single_step_task_emits_start_step_and_completion_events_in_order(pool: PgPool) {
    let (task_uuid, step_uuid) = seed_single_step_task(&pool).await;

    let config = TaskerConfig::default();
    let context = tasker_shared::SystemContext::with_pool(pool.clone(), config)
        .with_registry(Arc::new(tasker_shared::registry::HandlerRegistry::new()));

    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    context.event_bus.subscribe(recorder.clone()).await;

    let readiness = ReadinessEvaluator::new(pool.clone(), config);
    let executor = StepExecutor::new(pool.clone(), context.event_bus.clone(), context.processor_uuid, 10, None);
    let reenqueuer = Arc::new(SynchronousReenqueuer::new());
    let finalizer = TaskFinalizer::new(pool.clone(), context.event_bus.clone(), context.processor_uuid, reenqueuer.clone());

    let coordinator = TaskCoordinator::new(&context, readiness, executor, finalizer);

    let handler: Arc<dyn StepHandler> = Arc::new(AlwaysSucceeds);
    coordinator
        .run_pass(task_uuid, move |_name| Some(handler.clone()))
        .await
        .unwrap();

    let events = recorder.0.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "task_started",
            "step_started",
            "step_before_handle",
            "step_completed",
            "task_finalization_started",
            "task_completed",
            "task_finalization_completed",
        ]
    );
    let _ = step_uuid;
}
