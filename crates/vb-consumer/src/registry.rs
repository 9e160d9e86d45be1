//! Handler registry - maps event types to message handlers
//!
//! Pure lookup table with no I/O. Handlers are registered before
//! consumption starts; re-registering an event type replaces the previous
//! handler for all subsequent messages.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use crate::MessageHandler;

/// Mapping from `event_type` to the handler invoked for it
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register a handler for an event type. Last registration wins.
    pub fn register(&self, event_type: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let event_type = event_type.into();
        info!(event_type = %event_type, "Registered handler for event type");
        self.handlers.insert(event_type, handler);
    }

    /// Look up the handler for an event type
    pub fn lookup(&self, event_type: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers.get(event_type).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
