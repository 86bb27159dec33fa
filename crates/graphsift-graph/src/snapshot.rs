use graphsift_core::{Edge, EdgeId, Node, NodeId};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Edge {edge} references missing source node {node}")]
    MissingSource { edge: EdgeId, node: NodeId },
    #[error("Edge {edge} references missing target node {node}")]
    MissingTarget { edge: EdgeId, node: NodeId },
    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),
    #[error("Duplicate edge id: {0}")]
    DuplicateEdge(EdgeId),
}

/// What `GraphSnapshot::load_lossy` had to discard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub dropped_edges: Vec<EdgeId>,
    pub duplicate_nodes: Vec<NodeId>,
    pub duplicate_edges: Vec<EdgeId>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.dropped_edges.is_empty()
            && self.duplicate_nodes.is_empty()
            && self.duplicate_edges.is_empty()
    }
}

/// Immutable view of the last loaded graph.
///
/// A snapshot is never patched: a reload builds a new one and every piece of
/// derived state (discovery, collapse groups) is recomputed against it.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    incident: HashMap<NodeId, Vec<EdgeId>>,
}

impl GraphSnapshot {
    pub fn load(
        nodes: impl IntoIterator<Item = Node>,
        edges: impl IntoIterator<Item = Edge>,
    ) -> Result<Self, SnapshotError> {
        let mut snapshot = Self::default();
        for node in nodes {
            if snapshot.nodes.contains_key(&node.id) {
                return Err(SnapshotError::DuplicateNode(node.id));
            }
            snapshot.nodes.insert(node.id.clone(), node);
        }
        for edge in edges {
            if snapshot.edges.contains_key(&edge.id) {
                return Err(SnapshotError::DuplicateEdge(edge.id));
            }
            if !snapshot.nodes.contains_key(&edge.from) {
                return Err(SnapshotError::MissingSource {
                    node: edge.from,
                    edge: edge.id,
                });
            }
            if !snapshot.nodes.contains_key(&edge.to) {
                return Err(SnapshotError::MissingTarget {
                    node: edge.to,
                    edge: edge.id,
                });
            }
            snapshot.insert_edge(edge);
        }
        Ok(snapshot)
    }

    /// Like `load`, but keeps the first occurrence of duplicate ids and drops
    /// edges with a missing endpoint instead of failing. Backend queries run
    /// with a row limit can cut off the far end of an edge.
    pub fn load_lossy(
        nodes: impl IntoIterator<Item = Node>,
        edges: impl IntoIterator<Item = Edge>,
    ) -> (Self, LoadReport) {
        let mut snapshot = Self::default();
        let mut report = LoadReport::default();

        for node in nodes {
            if snapshot.nodes.contains_key(&node.id) {
                tracing::warn!("Ignoring duplicate node {} in graph load", node.id);
                report.duplicate_nodes.push(node.id);
                continue;
            }
            snapshot.nodes.insert(node.id.clone(), node);
        }

        for edge in edges {
            if snapshot.edges.contains_key(&edge.id) {
                tracing::warn!("Ignoring duplicate edge {} in graph load", edge.id);
                report.duplicate_edges.push(edge.id);
                continue;
            }
            if !snapshot.nodes.contains_key(&edge.from) {
                tracing::warn!(
                    "Dropping edge {} because source node {} is missing from snapshot",
                    edge.id,
                    edge.from
                );
                report.dropped_edges.push(edge.id);
                continue;
            }
            if !snapshot.nodes.contains_key(&edge.to) {
                tracing::warn!(
                    "Dropping edge {} because target node {} is missing from snapshot",
                    edge.id,
                    edge.to
                );
                report.dropped_edges.push(edge.id);
                continue;
            }
            snapshot.insert_edge(edge);
        }

        (snapshot, report)
    }

    fn insert_edge(&mut self, edge: Edge) {
        self.incident
            .entry(edge.from.clone())
            .or_default()
            .push(edge.id.clone());
        if edge.to != edge.from {
            self.incident
                .entry(edge.to.clone())
                .or_default()
                .push(edge.id.clone());
        }
        self.edges.insert(edge.id.clone(), edge);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn contains_edge(&self, id: &EdgeId) -> bool {
        self.edges.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn edge_ids(&self) -> impl Iterator<Item = &EdgeId> {
        self.edges.keys()
    }

    /// Edges with `node` as either endpoint, in load order.
    pub fn incident_edges(&self, node: &NodeId) -> impl Iterator<Item = &Edge> {
        self.incident
            .get(node)
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id))
    }
}
