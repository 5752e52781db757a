//! Lifecycle events
//!
//! The engine publishes one event per committed mutation. Dispatch is
//! synchronous: every subscribed observer runs on the calling thread, in
//! registration order, before the mutating call returns.
//!
//! Fan-out is not part of the mutation's transaction. An observer error is
//! logged and dropped; it never reaches the caller and never undoes the
//! write that triggered it. Observers run on every mutation's critical path,
//! so their work must stay cheap.

use std::sync::Arc;

use tracing::warn;

/// A committed change to a document or link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A new version was appended
    Written {
        path: String,
        version: u32,
        key: String,
        author: String,
    },
    /// Rows were tombstoned
    Deleted {
        path: String,
        /// The single version deleted, or 0 when the whole document was
        version: u32,
        /// Whether no live row remains for the path
        fully_deleted: bool,
        author: String,
    },
    /// A fully deleted document was brought back
    Restored { path: String, author: String },
    /// Every row of `from` now lives at `to`
    Moved {
        from: String,
        to: String,
        author: String,
    },
    /// A new lineage was started at `to` from `from`'s latest content
    Copied {
        from: String,
        to: String,
        key: String,
        author: String,
    },
    /// A new version copying older content was appended
    Reverted {
        path: String,
        version: u32,
        source_version: u32,
        author: String,
    },
    /// A link was created
    LinkCreated {
        id: String,
        from: String,
        to: String,
    },
    /// A link was explicitly soft-deleted
    LinkRemoved {
        id: String,
        from: String,
        to: String,
    },
}

impl Event {
    /// Short name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            Event::Written { .. } => "written",
            Event::Deleted { .. } => "deleted",
            Event::Restored { .. } => "restored",
            Event::Moved { .. } => "moved",
            Event::Copied { .. } => "copied",
            Event::Reverted { .. } => "reverted",
            Event::LinkCreated { .. } => "link_created",
            Event::LinkRemoved { .. } => "link_removed",
        }
    }

    /// Whether this is a document (not link) event
    pub fn is_document_event(&self) -> bool {
        !matches!(self, Event::LinkCreated { .. } | Event::LinkRemoved { .. })
    }
}

/// A subscriber invoked after each committed mutation
pub trait Observer: Send + Sync {
    /// Name used in logs and vacuum reports
    fn name(&self) -> &str;

    /// Whether this observer wants `event`
    fn accepts(&self, event: &Event) -> bool {
        let _ = event;
        true
    }

    /// Handle one event. Errors are logged by the bus and otherwise ignored.
    fn on_event(&self, event: &Event) -> anyhow::Result<()>;
}

/// Ordered list of observers
#[derive(Default, Clone)]
pub struct EventBus {
    observers: Vec<Arc<dyn Observer>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.observers.iter().map(|o| o.name()).collect();
        f.debug_struct("EventBus").field("observers", &names).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer; it runs after every observer added before it
    pub fn subscribe(&mut self, observer: Arc<dyn Observer>) {
        self.observers.push(observer);
    }

    /// Deliver `event` to every interested observer
    pub fn publish(&self, event: &Event) {
        for observer in &self.observers {
            if !observer.accepts(event) {
                continue;
            }
            if let Err(e) = observer.on_event(event) {
                warn!(
                    "Observer '{}' failed on {} event: {:#}",
                    observer.name(),
                    event.name(),
                    e
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
