//! Runtime counters for the event bus, in the style of the orchestration
//! crate's own atomic-counter statistics types.

use std::sync::atomic::{AtomicU64, Ordering};

use super::events::Event;

#[derive(Debug, Default)]
pub struct EventBusStatistics {
    published: AtomicU64,
    task_events: AtomicU64,
    step_events: AtomicU64,
}

impl EventBusStatistics {
    pub(super) fn record_published(&self, event: &Event) {
        self.published.fetch_add(1, Ordering::Relaxed);
        match event {
            Event::TaskInitializeRequested { .. }
            | Event::TaskStarted { .. }
            | Event::TaskCompleted { .. }
            | Event::TaskBlockedByFailures { .. }
            | Event::TaskCancelled { .. }
            | Event::TaskReenqueueStarted { .. }
            | Event::TaskFinalizationStarted { .. }
            | Event::TaskFinalizationCompleted { .. }
            | Event::TaskReenqueueRequested { .. }
            | Event::TaskReenqueueDelayed { .. }
            | Event::TaskReenqueueFailed { .. } => {
                self.task_events.fetch_add(1, Ordering::Relaxed);
            }
            Event::StepStarted { .. }
            | Event::StepBeforeHandle { .. }
            | Event::StepCompleted { .. }
            | Event::StepFailed { .. }
            | Event::StepRetryRequested { .. }
            | Event::StepBackoff { .. }
            | Event::StepCancelled { .. }
            | Event::StepSkipped { .. } => {
                self.step_events.fetch_add(1, Ordering::Relaxed);
            }
            Event::WorkflowStateUnclear { .. } | Event::WorkflowError { .. } => {}
        }
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn task_events(&self) -> u64 {
        self.task_events.load(Ordering::Relaxed)
    }

    pub fn step_events(&self) -> u64 {
        self.step_events.load(Ordering::Relaxed)
    }
}
