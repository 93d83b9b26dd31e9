//! Fetch event bus
//!
//! The orchestrator publishes a [`FetchEvent`] for every fetch transition and
//! the bus delivers it to each registered listener synchronously, on the
//! publishing task's thread. Listeners must therefore be cheap and must not
//! block; the progress listener only takes a short mutex.
//!
//! There is no global bus. Callers construct one and hand an `Arc<EventBus>`
//! to whoever needs to publish or subscribe.

use std::sync::{Arc, RwLock};

use tracing::trace;

use crate::app::models::FetchEvent;

/// Receiver of fetch events
pub trait FetchEventListener: Send + Sync {
    /// Handle one event. Called concurrently from many tasks.
    fn on_event(&self, event: &FetchEvent);
}

/// Synchronous publish/subscribe hub for fetch events
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn FetchEventListener>>>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a listener to all future events
    pub fn register(&self, listener: Arc<dyn FetchEventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// Deliver an event to every registered listener
    pub fn publish(&self, event: &FetchEvent) {
        // Snapshot so a listener that registers another listener cannot deadlock
        let listeners: Vec<Arc<dyn FetchEventListener>> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        trace!(
            "Publishing event for {} to {} listeners",
            event.key(),
            listeners.len()
        );

        for listener in listeners {
            listener.on_event(event);
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
