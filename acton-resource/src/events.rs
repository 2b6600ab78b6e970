//! Resource events delivered to in-process listeners
//!
//! Each successful handler emits one [`ResourceEvent`]. Listeners are
//! registered on the binder builder and invoked synchronously, in
//! registration order, on the request task.
//!
//! # Example
//!
//! ```rust
//! use acton_resource::events::{EventBus, EventKind, ResourceEvent};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let inserted = Arc::new(AtomicUsize::new(0));
//! let counter = inserted.clone();
//!
//! let mut bus = EventBus::new();
//! bus.subscribe(EventKind::Insert, move |_event: &ResourceEvent| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! bus.emit(&ResourceEvent::new(EventKind::Insert, serde_json::json!({"id": "a1"})));
//! assert_eq!(inserted.load(Ordering::SeqCst), 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which handler produced the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// List query answered; payload is the projected array
    Query,
    /// Single document fetched
    Detail,
    /// Document created
    Insert,
    /// Document modified
    Update,
    /// Document deleted; payload is its last known state
    Remove,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Detail => write!(f, "detail"),
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// An emitted event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEvent {
    /// Event kind
    pub kind: EventKind,
    /// Projected document or array of documents
    pub payload: Value,
    /// When the event was emitted
    pub occurred_at: DateTime<Utc>,
}

impl ResourceEvent {
    /// Event stamped with the current time
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            occurred_at: Utc::now(),
        }
    }
}

/// Receives resource events
///
/// Implemented for any `Fn(&ResourceEvent)` closure.
pub trait Listener: Send + Sync + 'static {
    /// Handle one event
    fn on_event(&self, event: &ResourceEvent);
}

impl<F> Listener for F
where
    F: Fn(&ResourceEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &ResourceEvent) {
        self(event)
    }
}

/// Listener registry keyed by event kind
///
/// Mutation needs `&mut self`; once the owning binder is shared the registry
/// is read-only.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: HashMap<EventKind, Vec<Arc<dyn Listener>>>,
}

impl EventBus {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `kind`
    pub fn subscribe<L: Listener>(&mut self, kind: EventKind, listener: L) {
        self.subscribe_arc(kind, Arc::new(listener));
    }

    /// Register a shared listener for `kind`
    pub fn subscribe_arc(&mut self, kind: EventKind, listener: Arc<dyn Listener>) {
        self.listeners.entry(kind).or_default().push(listener);
    }

    /// Number of listeners for `kind`
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to every listener of its kind
    pub fn emit(&self, event: &ResourceEvent) {
        let Some(listeners) = self.listeners.get(&event.kind) else {
            return;
        };
        tracing::debug!(kind = %event.kind, listeners = listeners.len(), "Emitting resource event");
        for listener in listeners {
            listener.on_event(event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<EventKind, usize> = self
            .listeners
            .iter()
            .map(|(kind, listeners)| (*kind, listeners.len()))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}
