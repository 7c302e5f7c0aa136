//! Notifications
//!
//! The only contract surface toward the hosting widget and the tree
//! model. Managers emit `EngineEvent`s through a shared `EventBus`;
//! background completion paths hold an `Arc` to the same bus.

use std::sync::{Arc, Mutex};

use crate::{CacheCategory, NodeId};

/// Notification emitted by the performance core
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Visible range moved past the change threshold
    RangeChanged { start: usize, end: usize },
    /// A load request was dispatched to the fetch pool
    LoadStarted { node: NodeId },
    /// A subtree fetch succeeded
    LoadCompleted { node: NodeId, children: usize },
    /// A subtree fetch failed
    LoadFailed { node: NodeId, error: String },
    /// Cache lookup satisfied from memory or disk
    CacheHit { key: String, category: CacheCategory },
    /// Cache lookup fell through to recomputation
    CacheMiss { key: String, category: CacheCategory },
    /// Aggregate usage crossed the pressure threshold
    MemoryPressure { usage_percent: f64 },
    /// A cleanup pass finished
    CleanupCompleted { freed_bytes: usize, usage_percent: f64 },
}

type Subscriber = Box<dyn Fn(&EngineEvent) + Send + Sync>;

/// Fan-out registry for engine notifications
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Subscribers must not call back into the
    /// engine; they run on whichever thread emits the event.
    pub fn subscribe<F>(&self, f: F)
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        self.subscribers.lock().unwrap().push(Box::new(f));
    }

    /// Deliver an event to every subscriber
    pub fn emit(&self, event: EngineEvent) {
        let subscribers = self.subscribers.lock().unwrap();
        for subscriber in subscribers.iter() {
            subscriber(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Event recorder for tests and diagnostics
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach this log to a bus
    pub fn attach(&self, bus: &EventBus) {
        let events = Arc::clone(&self.events);
        bus.subscribe(move |event| {
            events.lock().unwrap().push(event.clone());
        });
    }

    /// Snapshot of recorded events
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}
