use crate::snapshot::GraphSnapshot;
use graphsift_core::{EdgeId, NodeId};
use std::collections::BTreeSet;

/// Ids the renderer must hide. Complement of the visible set within the
/// snapshot, plus any edge left with a hidden endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Visibility {
    pub hidden_nodes: BTreeSet<NodeId>,
    pub hidden_edges: BTreeSet<EdgeId>,
}

impl Visibility {
    pub fn is_node_hidden(&self, id: &NodeId) -> bool {
        self.hidden_nodes.contains(id)
    }

    pub fn is_edge_hidden(&self, id: &EdgeId) -> bool {
        self.hidden_edges.contains(id)
    }
}

pub struct VisibilityResolver;

impl VisibilityResolver {
    /// Visible ids not present in the snapshot (synthetic ones) are ignored.
    pub fn resolve(
        snapshot: &GraphSnapshot,
        visible_nodes: &BTreeSet<NodeId>,
        visible_edges: &BTreeSet<EdgeId>,
    ) -> Visibility {
        let hidden_nodes: BTreeSet<NodeId> = snapshot
            .node_ids()
            .filter(|id| !visible_nodes.contains(*id))
            .cloned()
            .collect();

        let hidden_edges = snapshot
            .edges()
            .filter(|edge| {
                !visible_edges.contains(&edge.id)
                    || hidden_nodes.contains(&edge.from)
                    || hidden_nodes.contains(&edge.to)
            })
            .map(|edge| edge.id.clone())
            .collect();

        Visibility {
            hidden_nodes,
            hidden_edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphsift_core::{Edge, Node};

    fn snapshot() -> GraphSnapshot {
        GraphSnapshot::load(
            vec![Node::new("a"), Node::new("b"), Node::new("c")],
            vec![Edge::new("ab", "a", "b", "R"), Edge::new("bc", "b", "c", "R")],
        )
        .unwrap()
    }

    #[test]
    fn test_hidden_is_complement() {
        let snapshot = snapshot();
        let nodes = BTreeSet::from([NodeId::from("a"), NodeId::from("b")]);
        let edges = BTreeSet::from([EdgeId::from("ab")]);
        let visibility = VisibilityResolver::resolve(&snapshot, &nodes, &edges);
        assert_eq!(visibility.hidden_nodes, BTreeSet::from([NodeId::from("c")]));
        assert_eq!(visibility.hidden_edges, BTreeSet::from([EdgeId::from("bc")]));
    }

    #[test]
    fn test_edge_with_hidden_endpoint_is_hidden() {
        let snapshot = snapshot();
        let nodes = BTreeSet::from([NodeId::from("a"), NodeId::from("b")]);
        // `bc` is listed visible but `c` is not.
        let edges = BTreeSet::from([EdgeId::from("ab"), EdgeId::from("bc")]);
        let visibility = VisibilityResolver::resolve(&snapshot, &nodes, &edges);
        assert!(visibility.is_edge_hidden(&EdgeId::from("bc")));
        assert!(!visibility.is_edge_hidden(&EdgeId::from("ab")));
    }

    #[test]
    fn test_synthetic_ids_are_ignored() {
        let snapshot = snapshot();
        let nodes = BTreeSet::from([NodeId::from("collapsed-node:1"), NodeId::from("c")]);
        let edges = BTreeSet::from([EdgeId::from("reroute:1")]);
        let visibility = VisibilityResolver::resolve(&snapshot, &nodes, &edges);
        assert_eq!(visibility.hidden_nodes.len(), 2);
        assert_eq!(visibility.hidden_edges.len(), 2);
    }
}
