//! In-process event bus (§4.8). Subscribers are notified synchronously, in
//! registration order, after the publishing transition has already committed.
//! A subscriber failing never unwinds the transition that produced the event.

mod events;
mod statistics;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

pub use events::Event;
pub use statistics::EventBusStatistics;

/// Implemented by anything that reacts to bus events. Implementations should
/// stay fast; slow work belongs behind a queue the subscriber enqueues to.
#[async_trait]
pub trait Subscriber: Send + Sync + std::fmt::Debug {
    async fn on_event(&self, event: &Event);
}

/// Fan-out publisher. Cheap to clone: the subscriber list and statistics live
/// behind an `Arc`.
#[derive(Debug, Clone)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<Arc<dyn Subscriber>>>>,
    stats: Arc<EventBusStatistics>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            stats: Arc::new(EventBusStatistics::default()),
        }
    }

    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.write().await.push(subscriber);
    }

    pub fn statistics(&self) -> Arc<EventBusStatistics> {
        Arc::clone(&self.stats)
    }

    /// Delivers `event` to every subscriber. A subscriber panic or slow path is
    /// this method's problem, not the caller's: errors are logged, not
    /// propagated, since a lifecycle event has already happened by the time
    /// it's published.
    pub async fn publish(&self, event: Event) {
        self.stats.record_published(&event);
        let subscribers = self.subscribers.read().await;
        for subscriber in subscribers.iter() {
            subscriber.on_event(&event).await;
        }
        if subscribers.is_empty() {
            warn!(event = event.name(), "published event with no subscribers");
        }
    }
}
