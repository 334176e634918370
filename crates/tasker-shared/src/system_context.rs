//! Central dependency-injection aggregate (§2 component 1): pool, config,
//! event bus, registry, and processor identity, threaded through every
//! orchestration stage instead of each taking its dependencies piecemeal.

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::config::TaskerConfig;
use crate::event_bus::EventBus;
use crate::registry::HandlerRegistry;

/// Shared, cheaply-clonable context for one orchestration process.
#[derive(Debug, Clone)]
pub struct SystemContext {
    pub pool: PgPool,
    pub config: Arc<TaskerConfig>,
    pub event_bus: EventBus,
    pub registry: Arc<HandlerRegistry>,
    /// Identifies this process in transition audit rows and advisory locks.
    pub processor_uuid: Uuid,
}

impl SystemContext {
    /// Builds a context around an existing pool, generating a fresh processor
    /// identity and empty registry. Used by tests and by a freshly-started
    /// worker process.
    pub fn with_pool(pool: PgPool, config: TaskerConfig) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            event_bus: EventBus::new(),
            registry: Arc::new(HandlerRegistry::new()),
            processor_uuid: Uuid::now_v7(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = registry;
        self
    }
}
