pub mod collapse;
pub mod discovery;
pub mod predicate;
pub mod session;
pub mod snapshot;
pub mod time;
pub mod visibility;

pub use collapse::{
    CollapseEngine, CollapsedView, REPRESENTATIVE_LABEL, RepresentativeEdge, RepresentativeNode,
    RerouteEdge,
};
pub use discovery::{
    DEFAULT_TIME_FIELDS, PropertySummary, SessionSummary, available_properties, discover_sessions,
    discover_time_range,
};
pub use predicate::{InvalidPattern, PredicateReport, PropertyPredicateFilter, PropertySource};
pub use session::{
    Fallback, INFERRED_MARKER, RECENT_WINDOW_MS, SESSION_PROPERTIES, SessionSelection,
    SessionTimeSelector, session_of,
};
pub use snapshot::{GraphSnapshot, LoadReport, SnapshotError};
pub use time::parse_timestamp_ms;
pub use visibility::{Visibility, VisibilityResolver};

use graphsift_core::{EdgeId, NodeId};
use std::collections::BTreeSet;

/// A set of node and edge ids flowing between pipeline stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub nodes: BTreeSet<NodeId>,
    pub edges: BTreeSet<EdgeId>,
}

impl Selection {
    pub fn everything(snapshot: &GraphSnapshot) -> Self {
        Self {
            nodes: snapshot.node_ids().cloned().collect(),
            edges: snapshot.edge_ids().cloned().collect(),
        }
    }

    /// Nodes as given; edges are every snapshot edge with both endpoints in `nodes`.
    pub fn induced(snapshot: &GraphSnapshot, nodes: BTreeSet<NodeId>) -> Self {
        let edges = snapshot
            .edges()
            .filter(|e| nodes.contains(&e.from) && nodes.contains(&e.to))
            .map(|e| e.id.clone())
            .collect();
        Self { nodes, edges }
    }

    /// Drop edges whose `from` or `to` is not in the node set.
    pub fn retain_connected(&mut self, snapshot: &GraphSnapshot) {
        let nodes = &self.nodes;
        self.edges.retain(|id| {
            snapshot
                .edge(id)
                .is_some_and(|e| nodes.contains(&e.from) && nodes.contains(&e.to))
        });
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}
