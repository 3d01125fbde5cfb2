use crate::store::MemoryStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stratus_core::ResourceEvent;
use tokio::sync::broadcast;

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Capacity of the broadcast channel
    pub capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { capacity: 4096 }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Resource store
    pub store: Arc<MemoryStore>,

    /// Event bus sender: broadcast channel for resource mutation events
    pub event_tx: broadcast::Sender<ResourceEvent>,

    /// Monotonically increasing resource-version counter
    revision: Arc<AtomicU64>,
}

impl AppState {
    /// Create a new AppState with default event bus config
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self::with_event_bus_config(store, EventBusConfig::default())
    }

    /// Create a new AppState with custom event bus config
    pub fn with_event_bus_config(store: Arc<MemoryStore>, config: EventBusConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.capacity);
        Self {
            store,
            event_tx,
            revision: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Subscribe to resource events
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.event_tx.subscribe()
    }

    /// Allocate the next resource version
    pub fn next_resource_version(&self) -> String {
        self.revision.fetch_add(1, Ordering::Relaxed).to_string()
    }
}
