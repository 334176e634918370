//! Per-task coordinator loop (§2 component 5): fetch context, identify ready
//! steps, execute a batch, re-evaluate, then either finish or hand off.

use std::sync::Arc;
use std::time::Instant;

use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tracing::{instrument, warn};
use uuid::Uuid;

use tasker_shared::config::ExecutionConfig;
use tasker_shared::event_bus::{Event, EventBus};
use tasker_shared::models::core::{Task, WorkflowStep};
use tasker_shared::models::orchestration::StepReadinessStatus;
use tasker_shared::registry::HandlerRegistry;
use tasker_shared::state_machine::{StepEvent, StepStateMachine, TaskEvent, TaskState, TaskStateMachine, WorkflowStepState};
use tasker_shared::system_context::SystemContext;
use tasker_shared::OrchestrationResult;

use crate::executor::{StepExecutionRecord, StepExecutor};
use crate::finalization::{FinalizationResult, TaskFinalizer};
use crate::readiness::ReadinessEvaluator;

/// What a single coordinator pass accomplished, for callers that need to
/// decide whether to loop (production worker) or assert (tests).
#[derive(Debug)]
pub struct CoordinatorPassResult {
    pub steps_executed: usize,
    pub finalization: FinalizationResult,
}

/// Drives one task from "has ready steps" through execution to finalization,
/// bounded by a per-pass step/time budget so one task cannot starve others
/// sharing a worker (§4.3 back-pressure).
#[derive(Debug, Clone)]
pub struct TaskCoordinator {
    pool: PgPool,
    event_bus: EventBus,
    processor_uuid: Uuid,
    registry: Arc<HandlerRegistry>,
    readiness: ReadinessEvaluator,
    executor: StepExecutor,
    finalizer: TaskFinalizer,
    execution_config: ExecutionConfig,
}

impl TaskCoordinator {
    pub fn new(
        context: &SystemContext,
        readiness: ReadinessEvaluator,
        executor: StepExecutor,
        finalizer: TaskFinalizer,
    ) -> Self {
        Self {
            pool: context.pool.clone(),
            event_bus: context.event_bus.clone(),
            processor_uuid: context.processor_uuid,
            registry: Arc::clone(&context.registry),
            readiness,
            executor,
            finalizer,
            execution_config: context.config.execution,
        }
    }

    /// Acquires the per-task advisory lock, runs ready steps up to the
    /// configured budget, and finalizes based on the resulting execution
    /// context (§4.3 scheduling model, `pg_try_advisory_lock(hashtext(task_id))`).
    #[instrument(skip(self, task_template_for))]
    pub async fn run_pass<F>(
        &self,
        task_uuid: Uuid,
        task_template_for: F,
    ) -> OrchestrationResult<Option<CoordinatorPassResult>>
    where
        F: Fn(&str) -> Option<Arc<dyn tasker_shared::registry::StepHandler>>,
    {
        let Some(guard) = self.try_acquire_task_lock(task_uuid).await? else {
            return Ok(None);
        };

        // Release on every exit from `run_pass_locked`, success or error, so
        // a failed pass cannot leak the lock for this task's connection until
        // pool eviction (§4.3 scheduling model depends on the lock actually
        // becoming free for the next pass).
        let result = self.run_pass_locked(task_uuid, &task_template_for).await;
        guard.release().await;
        result.map(Some)
    }

    async fn run_pass_locked<F>(
        &self,
        task_uuid: Uuid,
        task_template_for: &F,
    ) -> OrchestrationResult<CoordinatorPassResult>
    where
        F: Fn(&str) -> Option<Arc<dyn tasker_shared::registry::StepHandler>>,
    {
        self.ensure_task_started(task_uuid).await?;

        let started = Instant::now();
        let mut total_executed = 0usize;

        loop {
            let (statuses, context) = self.readiness.evaluate(task_uuid).await?;
            let now = chrono::Utc::now();

            // The evaluator is a pure read; promoting a backed-off `error` step
            // back to `pending` once its retry window has elapsed is this
            // loop's job, not the evaluator's (§4.1, §4.2 "error -> pending on
            // retry reset"). Re-evaluate afterward so the ready set reflects
            // the promotion instead of racing it.
            if self.reset_retry_eligible_steps(&statuses, now).await? {
                continue;
            }

            // Same reasoning for skippable steps stuck behind a parent that
            // will never complete: nothing else will ever move them out of
            // `pending`, so the loop resolves them before checking readiness.
            if self.skip_blocked_skippable_steps(task_uuid, &statuses).await? {
                continue;
            }

            let ready: Vec<_> = statuses
                .iter()
                .filter(|s| s.ready_for_execution(now))
                .cloned()
                .collect();

            if ready.is_empty() {
                let finalization = self.finalizer.finalize(task_uuid, &context).await?;
                return Ok(CoordinatorPassResult {
                    steps_executed: total_executed,
                    finalization,
                });
            }

            let task = self.load_task(task_uuid).await?;
            let sequence = self.load_steps(task_uuid).await?;
            let named_steps = self.load_named_step_names(task_uuid).await?;

            let records = self
                .executor
                .execute_batch(&task, &sequence, &ready, |step_uuid| {
                    named_steps
                        .get(&step_uuid)
                        .and_then(|name| task_template_for(name))
                })
                .await?;

            total_executed += count_attempted(&records);

            if total_executed >= self.execution_config.coordinator_pass_step_budget
                || started.elapsed().as_millis() as u64
                    >= self.execution_config.coordinator_pass_time_budget_ms
            {
                let (_, context) = self.readiness.evaluate(task_uuid).await?;
                let finalization = self.finalizer.finalize(task_uuid, &context).await?;
                return Ok(CoordinatorPassResult {
                    steps_executed: total_executed,
                    finalization,
                });
            }
        }
    }

    /// Promotes every `error` step whose backoff has elapsed and whose
    /// retries are not exhausted back to `pending`, so the next readiness
    /// evaluation sees it as a normal ready candidate. Returns `true` if any
    /// step was reset, telling the caller to re-evaluate before building a
    /// batch (§4.2 "error -> pending on retry reset").
    async fn reset_retry_eligible_steps(
        &self,
        statuses: &[StepReadinessStatus],
        now: chrono::DateTime<chrono::Utc>,
    ) -> OrchestrationResult<bool> {
        let mut any_reset = false;
        for status in statuses {
            if status.current_state == WorkflowStepState::Error
                && status.retry_eligible()
                && status.backoff_expired(now)
            {
                let machine = StepStateMachine::for_step(status.step_uuid, self.pool.clone(), self.processor_uuid);
                machine.transition(StepEvent::ResetForRetry).await?;
                any_reset = true;
            }
        }
        Ok(any_reset)
    }

    /// Resolves every `skippable`, still-`pending` step whose dependencies
    /// can never be satisfied (a parent is `cancelled`, or `error` with
    /// retries exhausted) to `resolved_manually`, so it stops counting
    /// against the task's non-skippable completion total (§3 invariant 4,
    /// §9 open question). Returns `true` if any step was resolved.
    async fn skip_blocked_skippable_steps(
        &self,
        task_uuid: Uuid,
        statuses: &[StepReadinessStatus],
    ) -> OrchestrationResult<bool> {
        let mut any_skipped = false;
        for status in statuses {
            if status.current_state == WorkflowStepState::Pending && status.blocked_by_failed_parent() {
                let machine = StepStateMachine::for_step(status.step_uuid, self.pool.clone(), self.processor_uuid);
                machine.transition(StepEvent::Skip).await?;
                self.event_bus
                    .publish(Event::StepSkipped {
                        task_uuid,
                        step_uuid: status.step_uuid,
                    })
                    .await;
                any_skipped = true;
            }
        }
        Ok(any_skipped)
    }

    /// Moves a freshly-created task out of `Pending` the moment a worker
    /// actually starts looking at it, independent of how that first pass
    /// ends (completes in one shot, blocks, or needs another pass). Without
    /// this, a task whose steps all finish within a single `run_pass` would
    /// never observe the `Pending -> InProgress` edge the finalizer expects.
    async fn ensure_task_started(&self, task_uuid: Uuid) -> OrchestrationResult<()> {
        let machine = TaskStateMachine::for_task(task_uuid, self.pool.clone(), self.processor_uuid);
        if machine.current_state().await? == TaskState::Pending {
            machine.transition(TaskEvent::Start).await?;
            self.event_bus.publish(Event::TaskStarted { task_uuid }).await;
        }
        Ok(())
    }

    /// `pg_try_advisory_lock`/`pg_advisory_unlock` are session-scoped, so the
    /// acquire and the later release must run on the same backend connection.
    /// Pinning one [`PoolConnection`] for the lock's whole lifetime is what
    /// guarantees that, instead of each query checking out an arbitrary
    /// connection from `&self.pool`.
    async fn try_acquire_task_lock(&self, task_uuid: Uuid) -> OrchestrationResult<Option<TaskLockGuard>> {
        let mut conn = self.pool.acquire().await?;
        let (acquired,): (bool,) =
            sqlx::query_as("SELECT pg_try_advisory_lock(hashtext($1::text)::bigint)")
                .bind(task_uuid.to_string())
                .fetch_one(&mut *conn)
                .await?;

        if !acquired {
            return Ok(None);
        }
        Ok(Some(TaskLockGuard {
            conn: Some(conn),
            task_uuid,
        }))
    }

    async fn load_task(&self, task_uuid: Uuid) -> OrchestrationResult<Task> {
        let task: Task = sqlx::query_as("SELECT * FROM tasks WHERE task_uuid = $1")
            .bind(task_uuid)
            .fetch_one(&self.pool)
            .await?;
        Ok(task)
    }

    async fn load_steps(&self, task_uuid: Uuid) -> OrchestrationResult<Vec<WorkflowStep>> {
        let steps: Vec<WorkflowStep> =
            sqlx::query_as("SELECT * FROM workflow_steps WHERE task_uuid = $1")
                .bind(task_uuid)
                .fetch_all(&self.pool)
                .await?;
        Ok(steps)
    }

    async fn load_named_step_names(
        &self,
        task_uuid: Uuid,
    ) -> OrchestrationResult<std::collections::HashMap<Uuid, String>> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            "SELECT ws.workflow_step_uuid, ns.name FROM workflow_steps ws \
             JOIN named_steps ns ON ns.named_step_uuid = ws.named_step_uuid \
             WHERE ws.task_uuid = $1",
        )
        .bind(task_uuid)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}

fn count_attempted(records: &[StepExecutionRecord]) -> usize {
    records
        .iter()
        .filter(|r| !matches!(r.outcome, crate::executor::StepOutcomeKind::ClaimLost))
        .count()
}

/// Owns the one connection that acquired the task's advisory lock. The lock
/// is session-scoped, so release must happen on this exact connection via
/// the awaited [`Self::release`], called by the caller before `run_pass`
/// returns rather than from `Drop`, which cannot await.
struct TaskLockGuard {
    conn: Option<PoolConnection<Postgres>>,
    task_uuid: Uuid,
}

impl TaskLockGuard {
    async fn release(mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        if let Err(e) = sqlx::query("SELECT pg_advisory_unlock(hashtext($1::text)::bigint)")
            .bind(self.task_uuid.to_string())
            .execute(&mut *conn)
            .await
        {
            warn!(task_uuid = %self.task_uuid, error = %e, "failed to release task advisory lock");
        }
    }
}

impl Drop for TaskLockGuard {
    fn drop(&mut self) {
        if self.conn.is_some() {
            warn!(task_uuid = %self.task_uuid, "task advisory lock guard dropped without release; lock held until connection is evicted from the pool");
        }
    }
}
