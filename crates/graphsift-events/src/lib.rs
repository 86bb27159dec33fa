use crossbeam_channel::{Receiver, Sender, unbounded};
use graphsift_core::{EntityKind, SessionMode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Graph
    GraphLoaded {
        node_count: usize,
        edge_count: usize,
        dropped_edges: usize,
    },
    SessionsDiscovered {
        count: usize,
    },
    TimeRangeDiscovered {
        property: String,
        min_time: i64,
        max_time: i64,
    },

    // Pipeline
    FiltersApplied {
        visible_nodes: usize,
        visible_edges: usize,
        hidden_nodes: usize,
        hidden_edges: usize,
    },
    /// A regex predicate failed to compile and matched nothing.
    InvalidPattern {
        kind: EntityKind,
        property: String,
        pattern: String,
        error: String,
    },
    /// The requested mode could not run and everything is shown instead.
    SessionFallback {
        mode: SessionMode,
        message: String,
    },
    GroupsCollapsed {
        node_groups: usize,
        edge_groups: usize,
    },
    CollapseGroupExpanded {
        representative_id: String,
        restored: usize,
    },
    CollapseGroupsCleared {
        dissolved: usize,
    },

    // Persistence
    FilterStateSaved,
    FilterStateRestored,
    FilterStateSaveFailed {
        error: String,
    },

    // Notifications
    ShowInfo {
        message: String,
    },
    ShowWarning {
        message: String,
    },
    StatusUpdate {
        message: String,
    },
}

impl Event {
    /// Events carrying a message for the status bar.
    pub fn status_message(&self) -> Option<&str> {
        match self {
            Event::ShowInfo { message }
            | Event::ShowWarning { message }
            | Event::StatusUpdate { message }
            | Event::SessionFallback { message, .. } => Some(message),
            Event::FilterStateSaveFailed { error } => Some(error),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<Event> {
        self.tx.clone()
    }

    pub fn receiver(&self) -> Receiver<Event> {
        self.rx.clone()
    }

    pub fn publish(&self, event: Event) {
        tracing::trace!("publish {:?}", event);
        let _ = self.tx.send(event);
    }

    /// Dispatch all pending events to a listener.
    pub fn dispatch_to<L: EventListener>(&self, listener: &mut L) {
        while let Ok(event) = self.rx.try_recv() {
            listener.handle_event(&event);
        }
    }

    /// Take every pending event without blocking.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }
}

/// Implement this to receive events from the EventBus.
pub trait EventListener {
    fn handle_event(&mut self, event: &Event);
}
