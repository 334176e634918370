//! Shared types for the orchestration core: error taxonomy, configuration,
//! the task/step state machines, readiness/backoff math, the handler
//! registry, the event bus, and the `SystemContext` aggregate that threads
//! them all through the orchestration crate.

pub mod backoff;
pub mod config;
pub mod database;
pub mod errors;
pub mod event_bus;
pub mod models;
pub mod registry;
pub mod resilience;
pub mod state_machine;
pub mod system_context;

pub use config::TaskerConfig;
pub use errors::{OrchestrationError, OrchestrationResult, TaskerError, TaskerResult};
pub use system_context::SystemContext;
