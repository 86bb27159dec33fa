use crate::snapshot::GraphSnapshot;
use crate::time::parse_timestamp_ms;
use crate::Selection;
use graphsift_core::{Node, NodeId, SessionFilterConfig, SessionMode, TimeRangeConfig};
use std::collections::BTreeSet;

/// Node properties that identify a session, checked in order.
pub const SESSION_PROPERTIES: [&str; 3] = ["session_id", "sessionId", "session"];

/// Relationship labels containing this marker were produced by inference.
pub const INFERRED_MARKER: &str = "INF_REL";

/// `session-recent` keeps nodes stamped within this window before "now".
/// Fixed at 24h; it is not derived from the configured time range.
pub const RECENT_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// Why the selector showed everything instead of the requested mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    SessionRequired,
    NoTimeProperty,
}

impl Fallback {
    pub fn message(self) -> &'static str {
        match self {
            Self::SessionRequired => "Select a session to use this view mode. Showing all nodes.",
            Self::NoTimeProperty => {
                "No time property found in this graph. Showing all nodes."
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSelection {
    pub selection: Selection,
    pub fallback: Option<Fallback>,
}

/// The session a node belongs to, from the first session property it carries.
pub fn session_of(node: &Node) -> Option<&str> {
    SESSION_PROPERTIES.iter().find_map(|key| node.property(key))
}

fn is_inferred(label: &str) -> bool {
    label.contains(INFERRED_MARKER)
}

pub struct SessionTimeSelector;

impl SessionTimeSelector {
    pub fn resolve(
        snapshot: &GraphSnapshot,
        config: &SessionFilterConfig,
        time_range: &TimeRangeConfig,
        now_ms: i64,
    ) -> SessionSelection {
        let session = config.session();
        if config.mode.requires_session() && session.is_none() {
            return Self::fallback(snapshot, Fallback::SessionRequired);
        }

        let selection = match (config.mode, session) {
            (SessionMode::All, _) => Selection::everything(snapshot),
            (SessionMode::TimeRange, _) => {
                let Some(property) = time_range.property_name.as_deref() else {
                    return Self::fallback(snapshot, Fallback::NoTimeProperty);
                };
                Self::time_range(snapshot, property, time_range)
            }
            (SessionMode::Inferred, _) => Self::inferred(snapshot),
            (SessionMode::SessionOnly, Some(session)) => {
                Selection::induced(snapshot, Self::session_nodes(snapshot, session))
            }
            (SessionMode::SessionRecent, Some(session)) => {
                Self::session_recent(snapshot, session, time_range, now_ms)
            }
            (SessionMode::Hybrid, Some(session)) => Self::hybrid(snapshot, session),
            (SessionMode::DirectOnly, Some(session)) => Self::direct_only(snapshot, session),
            (_, None) => return Self::fallback(snapshot, Fallback::SessionRequired),
        };

        tracing::debug!(
            mode = config.mode.as_str(),
            nodes = selection.nodes.len(),
            edges = selection.edges.len(),
            "session selector resolved"
        );

        SessionSelection {
            selection,
            fallback: None,
        }
    }

    fn fallback(snapshot: &GraphSnapshot, reason: Fallback) -> SessionSelection {
        tracing::debug!("session selector falling back to all: {:?}", reason);
        SessionSelection {
            selection: Selection::everything(snapshot),
            fallback: Some(reason),
        }
    }

    fn session_nodes(snapshot: &GraphSnapshot, session: &str) -> BTreeSet<NodeId> {
        snapshot
            .nodes()
            .filter(|n| session_of(n) == Some(session))
            .map(|n| n.id.clone())
            .collect()
    }

    fn time_range(
        snapshot: &GraphSnapshot,
        property: &str,
        range: &TimeRangeConfig,
    ) -> Selection {
        let nodes = snapshot
            .nodes()
            .filter(|n| {
                n.property(property)
                    .and_then(parse_timestamp_ms)
                    .is_some_and(|ts| range.contains(ts))
            })
            .map(|n| n.id.clone())
            .collect();
        Selection::induced(snapshot, nodes)
    }

    fn session_recent(
        snapshot: &GraphSnapshot,
        session: &str,
        range: &TimeRangeConfig,
        now_ms: i64,
    ) -> Selection {
        let mut nodes = Self::session_nodes(snapshot, session);
        if let Some(property) = range.property_name.as_deref() {
            let cutoff = now_ms.saturating_sub(RECENT_WINDOW_MS);
            nodes.extend(
                snapshot
                    .nodes()
                    .filter(|n| {
                        n.property(property)
                            .and_then(parse_timestamp_ms)
                            .is_some_and(|ts| ts >= cutoff)
                    })
                    .map(|n| n.id.clone()),
            );
        }
        Selection::induced(snapshot, nodes)
    }

    fn inferred(snapshot: &GraphSnapshot) -> Selection {
        let mut selection = Selection::default();
        for edge in snapshot.edges().filter(|e| is_inferred(&e.label)) {
            selection.edges.insert(edge.id.clone());
            selection.nodes.insert(edge.from.clone());
            selection.nodes.insert(edge.to.clone());
        }
        selection
    }

    /// Nodes come only from retained edges, so an isolated session node is dropped.
    fn hybrid(snapshot: &GraphSnapshot, session: &str) -> Selection {
        let session_nodes = Self::session_nodes(snapshot, session);
        let mut selection = Selection::default();
        for edge in snapshot.edges() {
            let in_session = session_nodes.contains(&edge.from) && session_nodes.contains(&edge.to);
            if in_session || is_inferred(&edge.label) {
                selection.edges.insert(edge.id.clone());
                selection.nodes.insert(edge.from.clone());
                selection.nodes.insert(edge.to.clone());
            }
        }
        selection
    }

    fn direct_only(snapshot: &GraphSnapshot, session: &str) -> Selection {
        let session_nodes = Self::session_nodes(snapshot, session);
        let mut selection = Selection {
            nodes: session_nodes.clone(),
            edges: BTreeSet::new(),
        };
        for node in &session_nodes {
            for edge in snapshot.incident_edges(node) {
                selection.edges.insert(edge.id.clone());
                selection.nodes.insert(edge.from.clone());
                selection.nodes.insert(edge.to.clone());
            }
        }
        selection
    }
}
