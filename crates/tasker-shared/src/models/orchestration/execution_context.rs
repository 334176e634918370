use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Task-level classification derived from its steps' readiness statuses (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    HasReadySteps,
    Processing,
    BlockedByFailures,
    WaitingForDependencies,
    AllComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Recovering,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendedAction {
    ExecuteReadySteps,
    WaitForCompletion,
    HandleFailures,
    FinalizeTask,
}

/// Aggregate counts and classification for one task, computed fresh on every
/// readiness evaluation (§4.1).
#[derive(Debug, Clone)]
pub struct TaskExecutionContext {
    pub task_uuid: Uuid,
    pub total_steps: i64,
    pub pending_steps: i64,
    pub in_progress_steps: i64,
    pub completed_steps: i64,
    pub failed_steps: i64,
    pub ready_steps: i64,
    pub execution_status: ExecutionStatus,
    pub health_status: HealthStatus,
    pub recommended_action: RecommendedAction,
    /// Earliest `next_retry_at` among this task's steps still backed off, if
    /// any. The reenqueuer uses this to schedule the next pass for when a
    /// step's backoff actually elapses instead of immediately (§4.5, §4.2).
    pub next_wakeup_at: Option<DateTime<Utc>>,
}

impl TaskExecutionContext {
    /// Classifies execution status from raw counts (§3 invariant 4, §4.1).
    /// `non_skippable_total`/`non_skippable_completed` exclude skipped steps
    /// from the completion check since a skipped step satisfies its
    /// dependents without itself "running".
    pub fn classify(
        task_uuid: Uuid,
        total_steps: i64,
        pending_steps: i64,
        in_progress_steps: i64,
        completed_steps: i64,
        failed_steps: i64,
        ready_steps: i64,
        non_skippable_total: i64,
        non_skippable_completed: i64,
        next_wakeup_at: Option<DateTime<Utc>>,
    ) -> Self {
        let execution_status = if non_skippable_total > 0 && non_skippable_completed == non_skippable_total
        {
            ExecutionStatus::AllComplete
        } else if failed_steps > 0 && ready_steps == 0 && in_progress_steps == 0 {
            ExecutionStatus::BlockedByFailures
        } else if ready_steps > 0 {
            ExecutionStatus::HasReadySteps
        } else if in_progress_steps > 0 {
            ExecutionStatus::Processing
        } else {
            ExecutionStatus::WaitingForDependencies
        };

        let health_status = match execution_status {
            ExecutionStatus::AllComplete | ExecutionStatus::HasReadySteps => HealthStatus::Healthy,
            ExecutionStatus::BlockedByFailures => HealthStatus::Blocked,
            ExecutionStatus::Processing | ExecutionStatus::WaitingForDependencies => {
                if failed_steps > 0 {
                    HealthStatus::Recovering
                } else {
                    HealthStatus::Healthy
                }
            }
        };

        let recommended_action = match execution_status {
            ExecutionStatus::HasReadySteps => RecommendedAction::ExecuteReadySteps,
            ExecutionStatus::Processing | ExecutionStatus::WaitingForDependencies => {
                RecommendedAction::WaitForCompletion
            }
            ExecutionStatus::BlockedByFailures => RecommendedAction::HandleFailures,
            ExecutionStatus::AllComplete => RecommendedAction::FinalizeTask,
        };

        Self {
            task_uuid,
            total_steps,
            pending_steps,
            in_progress_steps,
            completed_steps,
            failed_steps,
            ready_steps,
            execution_status,
            health_status,
            recommended_action,
            next_wakeup_at,
        }
    }
}
