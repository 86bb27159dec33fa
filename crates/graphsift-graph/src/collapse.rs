use crate::snapshot::GraphSnapshot;
use crate::Selection;
use graphsift_core::{CollapseConfig, CollapsedGroup, Edge, EdgeId, EntityKind, GroupKey, Node, NodeId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Label carried by every representative node.
pub const REPRESENTATIVE_LABEL: &str = "CollapsedGroup";

const REPRESENTATIVE_NODE_PREFIX: &str = "collapsed-node:";
const REPRESENTATIVE_EDGE_PREFIX: &str = "collapsed-edge:";
const REROUTE_EDGE_PREFIX: &str = "reroute:";

/// Property on synthetic nodes/edges holding how many originals they stand for.
pub const COUNT_PROPERTY: &str = "collapsed_count";
pub const MULTIPLICITY_PROPERTY: &str = "multiplicity";

/// Synthetic node standing in for a group of nodes with the same group key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepresentativeNode {
    pub node: Node,
    pub constituent_ids: Vec<NodeId>,
    pub group_key: GroupKey,
    pub group_by: Vec<String>,
    /// Every candidate edge that touched a constituent when the group was
    /// formed, kept verbatim so expansion can restore it.
    pub original_edges: Vec<Edge>,
}

/// Synthetic edge between a representative and an outside node (or another
/// representative), summarising one or more parallel original edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RerouteEdge {
    pub edge: Edge,
    pub multiplicity: usize,
    pub original_edge_ids: Vec<EdgeId>,
}

/// Synthetic edge standing in for parallel edges with the same group key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepresentativeEdge {
    pub edge: Edge,
    pub constituent_ids: Vec<EdgeId>,
    pub group_key: GroupKey,
    pub group_by: Vec<String>,
    pub multiplicity: usize,
}

/// Ids visible after collapsing: untouched originals plus synthetic ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollapsedView {
    pub nodes: BTreeSet<NodeId>,
    pub edges: BTreeSet<EdgeId>,
}

impl From<Selection> for CollapsedView {
    fn from(selection: Selection) -> Self {
        Self {
            nodes: selection.nodes,
            edges: selection.edges,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RerouteKey {
    from: NodeId,
    to: NodeId,
    label: String,
}

/// Monotonic id source for synthetic entities. Reset by `cleanup`, so the
/// same input always yields the same ids.
#[derive(Debug, Default)]
struct SyntheticIds {
    nodes: u64,
    edges: u64,
    reroutes: u64,
}

impl SyntheticIds {
    fn node(&mut self, snapshot: &GraphSnapshot) -> NodeId {
        loop {
            self.nodes += 1;
            let id = NodeId(format!("{REPRESENTATIVE_NODE_PREFIX}{}", self.nodes));
            if !snapshot.contains_node(&id) {
                return id;
            }
        }
    }

    fn edge(&mut self, snapshot: &GraphSnapshot) -> EdgeId {
        loop {
            self.edges += 1;
            let id = EdgeId(format!("{REPRESENTATIVE_EDGE_PREFIX}{}", self.edges));
            if !snapshot.contains_edge(&id) {
                return id;
            }
        }
    }

    fn reroute(&mut self, snapshot: &GraphSnapshot) -> EdgeId {
        loop {
            self.reroutes += 1;
            let id = EdgeId(format!("{REROUTE_EDGE_PREFIX}{}", self.reroutes));
            if !snapshot.contains_edge(&id) {
                return id;
            }
        }
    }
}

fn group_key_for<'a>(values: impl Iterator<Item = Option<&'a str>>) -> GroupKey {
    GroupKey::from_values(values)
}

/// Reversible grouping of nodes and parallel edges by shared property values.
///
/// The engine owns every synthetic entity it creates. `collapse` always starts
/// from a clean slate, so repeated applies never leave orphans from an
/// earlier `group_by`.
#[derive(Debug, Default)]
pub struct CollapseEngine {
    ids: SyntheticIds,
    representatives: BTreeMap<NodeId, RepresentativeNode>,
    member_of: HashMap<NodeId, NodeId>,
    reroutes: BTreeMap<EdgeId, RerouteEdge>,
    reroute_index: HashMap<RerouteKey, EdgeId>,
    representative_edges: BTreeMap<EdgeId, RepresentativeEdge>,
    node_groups: BTreeMap<GroupKey, CollapsedGroup>,
    edge_groups: BTreeMap<GroupKey, CollapsedGroup>,
    view: CollapsedView,
}

impl CollapseEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run node collapse then edge collapse for whichever configs are active.
    pub fn collapse(
        &mut self,
        snapshot: &GraphSnapshot,
        candidate: &Selection,
        nodes: &CollapseConfig,
        edges: &CollapseConfig,
    ) -> &CollapsedView {
        self.cleanup();
        self.view = candidate.clone().into();
        if nodes.is_active() {
            self.group_nodes(snapshot, &nodes.group_by);
        }
        if edges.is_active() {
            self.group_edges(snapshot, &edges.group_by);
        }
        &self.view
    }

    pub fn collapse_nodes(
        &mut self,
        snapshot: &GraphSnapshot,
        candidate: &Selection,
        group_by: &[String],
    ) -> &CollapsedView {
        self.cleanup();
        self.view = candidate.clone().into();
        self.group_nodes(snapshot, group_by);
        &self.view
    }

    /// Group parallel edges of the current view. Existing edge groups are
    /// expanded first; node groups are left alone.
    pub fn collapse_edges(
        &mut self,
        snapshot: &GraphSnapshot,
        group_by: &[String],
    ) -> &CollapsedView {
        let existing: Vec<EdgeId> = self.representative_edges.keys().cloned().collect();
        for id in existing {
            self.expand_edge(&id);
        }
        self.group_edges(snapshot, group_by);
        &self.view
    }

    /// Drop every synthetic node and edge and forget all groups.
    /// Returns how many groups were dissolved.
    pub fn cleanup(&mut self) -> usize {
        let dissolved = self.node_groups.len() + self.edge_groups.len();
        if dissolved > 0 {
            tracing::debug!("Dissolving {} collapse groups", dissolved);
        }
        self.ids = SyntheticIds::default();
        self.representatives.clear();
        self.member_of.clear();
        self.reroutes.clear();
        self.reroute_index.clear();
        self.representative_edges.clear();
        self.node_groups.clear();
        self.edge_groups.clear();
        self.view = CollapsedView::default();
        dissolved
    }

    fn resolve(&self, id: &NodeId) -> NodeId {
        self.member_of.get(id).unwrap_or(id).clone()
    }

    fn group_nodes(&mut self, snapshot: &GraphSnapshot, group_by: &[String]) {
        if group_by.is_empty() {
            return;
        }

        // 1. Partition candidates by group key
        let mut partitions: BTreeMap<GroupKey, Vec<NodeId>> = BTreeMap::new();
        for id in &self.view.nodes {
            let Some(node) = snapshot.node(id) else {
                continue;
            };
            let key = group_key_for(group_by.iter().map(|prop| node.property(prop)));
            partitions.entry(key).or_default().push(id.clone());
        }

        // 2. Synthesize representatives for partitions of two or more
        for (key, members) in partitions {
            if members.len() < 2 {
                continue;
            }
            let rep_id = self.ids.node(snapshot);
            let mut node = Node::new(rep_id.0.clone())
                .with_label(REPRESENTATIVE_LABEL)
                .with_property(COUNT_PROPERTY, members.len().to_string())
                .with_display_name(format!("{} ({})", key, members.len()));
            for (prop, value) in group_by.iter().zip(key.components()) {
                if let Some(value) = value {
                    node.properties.insert(prop.clone(), value.clone());
                }
            }

            for member in &members {
                self.view.nodes.remove(member);
                self.member_of.insert(member.clone(), rep_id.clone());
            }
            self.view.nodes.insert(rep_id.clone());

            self.node_groups.insert(
                key.clone(),
                CollapsedGroup {
                    group_key: key.clone(),
                    representative_id: rep_id.0.clone(),
                    member_ids: members.iter().map(|m| m.0.clone()).collect(),
                },
            );
            self.representatives.insert(
                rep_id,
                RepresentativeNode {
                    node,
                    constituent_ids: members,
                    group_key: key,
                    group_by: group_by.to_vec(),
                    original_edges: Vec::new(),
                },
            );
        }

        if self.representatives.is_empty() {
            return;
        }

        // 3. Reroute or absorb every edge touching a constituent
        let edge_ids: Vec<EdgeId> = self.view.edges.iter().cloned().collect();
        for edge_id in edge_ids {
            let Some(edge) = snapshot.edge(&edge_id) else {
                continue;
            };
            let from = self.resolve(&edge.from);
            let to = self.resolve(&edge.to);
            if from == edge.from && to == edge.to {
                continue;
            }

            self.record_original(&from, &edge.from, edge);
            if to != from {
                self.record_original(&to, &edge.to, edge);
            }

            self.view.edges.remove(&edge_id);
            if from == to {
                // Both ends inside the same group: absorbed.
                continue;
            }
            self.add_to_reroute(snapshot, from, to, edge);
        }

        tracing::debug!(
            groups = self.node_groups.len(),
            reroutes = self.reroutes.len(),
            "node collapse applied"
        );
    }

    fn record_original(&mut self, resolved: &NodeId, original: &NodeId, edge: &Edge) {
        if resolved == original {
            return;
        }
        if let Some(rep) = self.representatives.get_mut(resolved) {
            rep.original_edges.push(edge.clone());
        }
    }

    fn add_to_reroute(&mut self, snapshot: &GraphSnapshot, from: NodeId, to: NodeId, edge: &Edge) {
        let key = RerouteKey {
            from,
            to,
            label: edge.label.clone(),
        };
        if let Some(existing) = self
            .reroute_index
            .get(&key)
            .and_then(|id| self.reroutes.get_mut(id))
        {
            existing.multiplicity += 1;
            existing.original_edge_ids.push(edge.id.clone());
            existing.edge.properties.insert(
                MULTIPLICITY_PROPERTY.to_string(),
                existing.multiplicity.to_string(),
            );
            return;
        }

        let id = self.ids.reroute(snapshot);
        let reroute = RerouteEdge {
            edge: Edge {
                id: id.clone(),
                from: key.from.clone(),
                to: key.to.clone(),
                label: key.label.clone(),
                properties: [(MULTIPLICITY_PROPERTY.to_string(), "1".to_string())]
                    .into_iter()
                    .collect(),
            },
            multiplicity: 1,
            original_edge_ids: vec![edge.id.clone()],
        };
        self.view.edges.insert(id.clone());
        self.reroute_index.insert(key, id.clone());
        self.reroutes.insert(id, reroute);
    }

    fn group_edges(&mut self, snapshot: &GraphSnapshot, group_by: &[String]) {
        if group_by.is_empty() {
            return;
        }

        // Only original edges between visible nodes take part; reroutes are
        // already aggregated.
        let mut partitions: BTreeMap<GroupKey, Vec<&Edge>> = BTreeMap::new();
        for id in &self.view.edges {
            let Some(edge) = snapshot.edge(id) else {
                continue;
            };
            let endpoints = [Some(edge.from.as_str()), Some(edge.to.as_str())];
            let values = group_by.iter().map(|prop| edge.property(prop));
            let key = group_key_for(endpoints.into_iter().chain(values));
            partitions.entry(key).or_default().push(edge);
        }

        for (key, members) in partitions {
            if members.len() < 2 {
                continue;
            }
            let rep_id = self.ids.edge(snapshot);
            let mut labels: Vec<&str> = members.iter().map(|e| e.label.as_str()).collect();
            labels.sort_unstable();
            labels.dedup();

            let mut edge = Edge {
                id: rep_id.clone(),
                from: members[0].from.clone(),
                to: members[0].to.clone(),
                label: labels.join("|"),
                properties: Default::default(),
            };
            edge.properties.insert(
                MULTIPLICITY_PROPERTY.to_string(),
                members.len().to_string(),
            );
            for (prop, value) in group_by.iter().zip(key.components().iter().skip(2)) {
                if let Some(value) = value {
                    edge.properties.insert(prop.clone(), value.clone());
                }
            }

            let constituent_ids: Vec<EdgeId> = members.iter().map(|e| e.id.clone()).collect();
            for id in &constituent_ids {
                self.view.edges.remove(id);
            }
            self.view.edges.insert(rep_id.clone());

            self.edge_groups.insert(
                key.clone(),
                CollapsedGroup {
                    group_key: key.clone(),
                    representative_id: rep_id.0.clone(),
                    member_ids: constituent_ids.iter().map(|e| e.0.clone()).collect(),
                },
            );
            self.representative_edges.insert(
                rep_id,
                RepresentativeEdge {
                    edge,
                    multiplicity: constituent_ids.len(),
                    constituent_ids,
                    group_key: key,
                    group_by: group_by.to_vec(),
                },
            );
        }

        tracing::debug!(groups = self.edge_groups.len(), "edge collapse applied");
    }

    /// Undo one node group: its constituents become visible again and its
    /// original edges come back, re-routed to any other group still collapsed.
    ///
    /// Returns the restored node ids, or `None` if `representative_id` is not
    /// an active representative.
    pub fn expand(
        &mut self,
        snapshot: &GraphSnapshot,
        representative_id: &NodeId,
    ) -> Option<Vec<NodeId>> {
        let Some(rep) = self.representatives.remove(representative_id) else {
            tracing::warn!(
                "Ignoring expand of unknown representative {}",
                representative_id
            );
            return None;
        };

        // 1. Remove reroutes attached to this representative
        let detached: Vec<EdgeId> = self
            .reroutes
            .iter()
            .filter(|(_, r)| r.edge.touches(representative_id))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &detached {
            if let Some(reroute) = self.reroutes.remove(id) {
                self.reroute_index.remove(&RerouteKey {
                    from: reroute.edge.from,
                    to: reroute.edge.to,
                    label: reroute.edge.label,
                });
            }
            self.view.edges.remove(id);
        }

        // 2. Constituents back in view
        self.view.nodes.remove(representative_id);
        for member in &rep.constituent_ids {
            self.member_of.remove(member);
            self.view.nodes.insert(member.clone());
        }

        // 3. Restore original edges whose endpoints still exist
        let mut restored_edges = 0usize;
        for edge in &rep.original_edges {
            let from = self.resolve(&edge.from);
            let to = self.resolve(&edge.to);
            if !self.view.nodes.contains(&from) || !self.view.nodes.contains(&to) {
                continue;
            }
            if from == edge.from && to == edge.to {
                self.view.edges.insert(edge.id.clone());
                restored_edges += 1;
            } else if from != to {
                self.add_rerouted_original(snapshot, from, to, edge);
            }
        }

        self.node_groups.remove(&rep.group_key);
        tracing::debug!(
            "Expanded {} into {} nodes and {} edges",
            representative_id,
            rep.constituent_ids.len(),
            restored_edges
        );
        Some(rep.constituent_ids)
    }

    /// Re-attach an original edge to a group that is still collapsed. New
    /// reroutes continue the existing id sequence.
    fn add_rerouted_original(
        &mut self,
        snapshot: &GraphSnapshot,
        from: NodeId,
        to: NodeId,
        edge: &Edge,
    ) {
        let key = RerouteKey {
            from,
            to,
            label: edge.label.clone(),
        };
        if let Some(existing) = self
            .reroute_index
            .get(&key)
            .and_then(|id| self.reroutes.get_mut(id))
        {
            if !existing.original_edge_ids.contains(&edge.id) {
                existing.multiplicity += 1;
                existing.original_edge_ids.push(edge.id.clone());
                existing.edge.properties.insert(
                    MULTIPLICITY_PROPERTY.to_string(),
                    existing.multiplicity.to_string(),
                );
            }
            return;
        }

        let id = self.ids.reroute(snapshot);
        let reroute = RerouteEdge {
            edge: Edge {
                id: id.clone(),
                from: key.from.clone(),
                to: key.to.clone(),
                label: key.label.clone(),
                properties: [(MULTIPLICITY_PROPERTY.to_string(), "1".to_string())]
                    .into_iter()
                    .collect(),
            },
            multiplicity: 1,
            original_edge_ids: vec![edge.id.clone()],
        };
        self.view.edges.insert(id.clone());
        self.reroute_index.insert(key, id.clone());
        self.reroutes.insert(id, reroute);
    }

    /// Undo one edge group. Returns the restored edge ids, or `None` if the id
    /// is not an active representative edge.
    pub fn expand_edge(&mut self, representative_id: &EdgeId) -> Option<Vec<EdgeId>> {
        let Some(rep) = self.representative_edges.remove(representative_id) else {
            tracing::warn!(
                "Ignoring expand of unknown representative edge {}",
                representative_id
            );
            return None;
        };
        self.view.edges.remove(representative_id);
        for id in &rep.constituent_ids {
            self.view.edges.insert(id.clone());
        }
        self.edge_groups.remove(&rep.group_key);
        Some(rep.constituent_ids)
    }

    /// Expand every active group without dissolving the view.
    pub fn expand_all(&mut self, snapshot: &GraphSnapshot) -> (Vec<NodeId>, Vec<EdgeId>) {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let edge_reps: Vec<EdgeId> = self.representative_edges.keys().cloned().collect();
        for id in edge_reps {
            edges.extend(self.expand_edge(&id).unwrap_or_default());
        }
        let node_reps: Vec<NodeId> = self.representatives.keys().cloned().collect();
        for id in node_reps {
            nodes.extend(self.expand(snapshot, &id).unwrap_or_default());
        }
        (nodes, edges)
    }

    pub fn view(&self) -> &CollapsedView {
        &self.view
    }

    pub fn is_collapsed(&self) -> bool {
        !self.node_groups.is_empty() || !self.edge_groups.is_empty()
    }

    pub fn groups(&self, kind: EntityKind) -> &BTreeMap<GroupKey, CollapsedGroup> {
        match kind {
            EntityKind::Node => &self.node_groups,
            EntityKind::Edge => &self.edge_groups,
        }
    }

    pub fn representative(&self, id: &NodeId) -> Option<&RepresentativeNode> {
        self.representatives.get(id)
    }

    pub fn representatives(&self) -> impl Iterator<Item = &RepresentativeNode> {
        self.representatives.values()
    }

    pub fn representative_of(&self, member: &NodeId) -> Option<&NodeId> {
        self.member_of.get(member)
    }

    pub fn reroute(&self, id: &EdgeId) -> Option<&RerouteEdge> {
        self.reroutes.get(id)
    }

    pub fn reroutes(&self) -> impl Iterator<Item = &RerouteEdge> {
        self.reroutes.values()
    }

    pub fn representative_edge(&self, id: &EdgeId) -> Option<&RepresentativeEdge> {
        self.representative_edges.get(id)
    }

    pub fn representative_edges(&self) -> impl Iterator<Item = &RepresentativeEdge> {
        self.representative_edges.values()
    }

    /// The synthetic node behind `id`, if it is a representative.
    pub fn synthetic_node(&self, id: &NodeId) -> Option<&Node> {
        self.representatives.get(id).map(|r| &r.node)
    }

    /// The synthetic edge behind `id`, if it is a reroute or representative edge.
    pub fn synthetic_edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.reroutes
            .get(id)
            .map(|r| &r.edge)
            .or_else(|| self.representative_edges.get(id).map(|r| &r.edge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn nid(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn eid(id: &str) -> EdgeId {
        EdgeId::from(id)
    }

    fn group_by(props: &[&str]) -> Vec<String> {
        props.iter().map(|p| p.to_string()).collect()
    }

    /// Scenario: a and b share `type`, both point at c; c points at d.
    fn scenario_a() -> GraphSnapshot {
        GraphSnapshot::load(
            vec![
                Node::new("a").with_property("type", "doc"),
                Node::new("b").with_property("type", "doc"),
                Node::new("c").with_property("type", "topic"),
                Node::new("d").with_property("type", "user"),
            ],
            vec![
                Edge::new("ac", "a", "c", "MENTIONS"),
                Edge::new("bc", "b", "c", "MENTIONS"),
                Edge::new("cd", "c", "d", "OWNED_BY"),
            ],
        )
        .unwrap()
    }

    /// Endpoint pairs and labels of visible edges, synthetic ids resolved.
    fn edge_shapes(
        engine: &CollapseEngine,
        snapshot: &GraphSnapshot,
    ) -> BTreeSet<(String, String, String)> {
        engine
            .view()
            .edges
            .iter()
            .map(|id| {
                let edge = snapshot
                    .edge(id)
                    .or_else(|| engine.synthetic_edge(id))
                    .unwrap();
                (edge.from.0.clone(), edge.to.0.clone(), edge.label.clone())
            })
            .collect()
    }

    #[test]
    fn test_scenario_a_collapses_pair_into_representative() {
        let snapshot = scenario_a();
        let mut engine = CollapseEngine::new();
        let view = engine
            .collapse_nodes(&snapshot, &Selection::everything(&snapshot), &group_by(&["type"]))
            .clone();

        let rep_id = nid("collapsed-node:1");
        assert_eq!(
            view.nodes,
            BTreeSet::from([rep_id.clone(), nid("c"), nid("d")])
        );

        let rep = engine.representative(&rep_id).unwrap();
        assert_eq!(rep.constituent_ids, vec![nid("a"), nid("b")]);
        assert_eq!(rep.node.property("type"), Some("doc"));
        assert_eq!(rep.node.property(COUNT_PROPERTY), Some("2"));
        let originals: Vec<&str> = rep.original_edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(originals, vec!["ac", "bc"]);

        let reroutes: Vec<&RerouteEdge> = engine.reroutes().collect();
        assert_eq!(reroutes.len(), 1);
        assert_eq!(reroutes[0].edge.from, rep_id);
        assert_eq!(reroutes[0].edge.to, nid("c"));
        assert_eq!(reroutes[0].multiplicity, 2);
        assert_eq!(reroutes[0].original_edge_ids, vec![eid("ac"), eid("bc")]);
        assert_eq!(reroutes[0].edge.property(MULTIPLICITY_PROPERTY), Some("2"));

        assert_eq!(
            view.edges,
            BTreeSet::from([eid("cd"), reroutes[0].edge.id.clone()])
        );

        let group = engine.groups(EntityKind::Node).values().next().unwrap();
        assert_eq!(group.group_key.to_string(), "doc");
        assert_eq!(group.member_ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_internal_edges_are_absorbed() {
        let snapshot = GraphSnapshot::load(
            vec![
                Node::new("a").with_property("k", "1"),
                Node::new("b").with_property("k", "1"),
                Node::new("c").with_property("k", "2"),
            ],
            vec![Edge::new("ab", "a", "b", "R"), Edge::new("bc", "b", "c", "R")],
        )
        .unwrap();
        let mut engine = CollapseEngine::new();
        engine.collapse_nodes(&snapshot, &Selection::everything(&snapshot), &group_by(&["k"]));

        assert!(!engine.view().edges.contains(&eid("ab")));
        assert_eq!(engine.reroutes().count(), 1);
        let rep = engine.representative(&nid("collapsed-node:1")).unwrap();
        let originals: Vec<&str> = rep.original_edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(originals, vec!["ab", "bc"]);
    }

    #[test]
    fn test_missing_property_groups_under_sentinel() {
        let snapshot = GraphSnapshot::load(
            vec![Node::new("a"), Node::new("b"), Node::new("c").with_property("k", "null")],
            Vec::new(),
        )
        .unwrap();
        let mut engine = CollapseEngine::new();
        engine.collapse_nodes(&snapshot, &Selection::everything(&snapshot), &group_by(&["k"]));

        let groups = engine.groups(EntityKind::Node);
        assert_eq!(groups.len(), 1);
        let group = groups.values().next().unwrap();
        assert_eq!(group.group_key.to_string(), "null");
        assert!(group.group_key.is_all_missing());
        // A literal "null" value is its own singleton partition.
        assert!(engine.view().nodes.contains(&nid("c")));
    }

    #[test]
    fn test_edges_between_two_groups_connect_representatives() {
        let snapshot = GraphSnapshot::load(
            vec![
                Node::new("a1").with_property("k", "a"),
                Node::new("a2").with_property("k", "a"),
                Node::new("b1").with_property("k", "b"),
                Node::new("b2").with_property("k", "b"),
            ],
            vec![
                Edge::new("e1", "a1", "b1", "R"),
                Edge::new("e2", "a2", "b2", "R"),
                Edge::new("e3", "a1", "b2", "S"),
            ],
        )
        .unwrap();
        let mut engine = CollapseEngine::new();
        engine.collapse_nodes(&snapshot, &Selection::everything(&snapshot), &group_by(&["k"]));

        let ra = nid("collapsed-node:1");
        let rb = nid("collapsed-node:2");
        assert_eq!(
            edge_shapes(&engine, &snapshot),
            BTreeSet::from([
                (ra.0.clone(), rb.0.clone(), "R".to_string()),
                (ra.0.clone(), rb.0.clone(), "S".to_string()),
            ])
        );

        // Expanding one side re-routes its edges to the other representative.
        engine.expand(&snapshot, &ra).unwrap();
        assert_eq!(
            edge_shapes(&engine, &snapshot),
            BTreeSet::from([
                ("a1".to_string(), rb.0.clone(), "R".to_string()),
                ("a2".to_string(), rb.0.clone(), "R".to_string()),
                ("a1".to_string(), rb.0.clone(), "S".to_string()),
            ])
        );

        engine.expand(&snapshot, &rb).unwrap();
        assert_eq!(engine.reroutes().count(), 0);
        assert_eq!(
            engine.view().edges,
            BTreeSet::from([eid("e1"), eid("e2"), eid("e3")])
        );
    }

    #[test]
    fn test_reroutes_made_on_expand_skip_snapshot_ids() {
        let snapshot = GraphSnapshot::load(
            vec![
                Node::new("a1").with_property("k", "a"),
                Node::new("a2").with_property("k", "a"),
                Node::new("b1").with_property("k", "b"),
                Node::new("b2").with_property("k", "b"),
            ],
            vec![
                Edge::new("e1", "a1", "b1", "R"),
                Edge::new("e2", "a1", "b1", "S"),
                Edge::new("reroute:3", "a1", "a2", "R"),
            ],
        )
        .unwrap();
        let all = Selection::everything(&snapshot);
        let mut engine = CollapseEngine::new();
        engine.collapse_nodes(&snapshot, &all, &group_by(&["k"]));

        engine.expand(&snapshot, &nid("collapsed-node:1")).unwrap();
        assert!(engine.synthetic_edge(&eid("reroute:3")).is_none());
        assert!(engine.view().edges.contains(&eid("reroute:3")));

        engine.expand(&snapshot, &nid("collapsed-node:2")).unwrap();
        assert_eq!(engine.view().edges, all.edges);
        assert_eq!(engine.view().nodes, all.nodes);
    }

    #[test]
    fn test_expand_restores_scenario_a() {
        let snapshot = scenario_a();
        let all = Selection::everything(&snapshot);
        let mut engine = CollapseEngine::new();
        engine.collapse_nodes(&snapshot, &all, &group_by(&["type"]));

        let restored = engine.expand(&snapshot, &nid("collapsed-node:1")).unwrap();
        assert_eq!(restored, vec![nid("a"), nid("b")]);
        assert_eq!(engine.view().nodes, all.nodes);
        assert_eq!(engine.view().edges, all.edges);
        assert!(engine.groups(EntityKind::Node).is_empty());
        assert_eq!(engine.reroutes().count(), 0);
    }

    #[test]
    fn test_expand_unknown_is_noop() {
        let snapshot = scenario_a();
        let mut engine = CollapseEngine::new();
        engine.collapse_nodes(&snapshot, &Selection::everything(&snapshot), &group_by(&["type"]));
        let before = engine.view().clone();
        assert_eq!(engine.expand(&snapshot, &nid("collapsed-node:99")), None);
        assert_eq!(engine.view(), &before);
    }

    #[test]
    fn test_recollapse_does_not_leak_previous_groups() {
        let snapshot = scenario_a();
        let all = Selection::everything(&snapshot);
        let mut engine = CollapseEngine::new();
        let first = engine.collapse_nodes(&snapshot, &all, &group_by(&["type"])).clone();
        let again = engine.collapse_nodes(&snapshot, &all, &group_by(&["type"])).clone();
        assert_eq!(first, again);
        assert_eq!(engine.representatives().count(), 1);

        let nothing = engine.collapse_nodes(&snapshot, &all, &group_by(&["missing"])).clone();
        // Every node lacks `missing`, so all four fold into one group.
        assert_eq!(nothing.nodes.len(), 1);
        assert_eq!(engine.representatives().count(), 1);

        engine.cleanup();
        assert!(!engine.is_collapsed());
        assert!(engine.view().nodes.is_empty());
    }

    #[test]
    fn test_synthetic_ids_skip_snapshot_collisions() {
        let snapshot = GraphSnapshot::load(
            vec![
                Node::new("collapsed-node:1").with_property("k", "x"),
                Node::new("a").with_property("k", "y"),
                Node::new("b").with_property("k", "y"),
            ],
            Vec::new(),
        )
        .unwrap();
        let mut engine = CollapseEngine::new();
        let view = engine
            .collapse_nodes(&snapshot, &Selection::everything(&snapshot), &group_by(&["k"]))
            .clone();
        assert!(view.nodes.contains(&nid("collapsed-node:1")));
        assert!(view.nodes.contains(&nid("collapsed-node:2")));
        assert!(engine.representative(&nid("collapsed-node:2")).is_some());
    }

    #[test]
    fn test_edge_collapse_groups_parallel_edges() {
        let snapshot = GraphSnapshot::load(
            vec![Node::new("a"), Node::new("b")],
            vec![
                Edge::new("e1", "a", "b", "SAID").with_property("channel", "chat"),
                Edge::new("e2", "a", "b", "SAID").with_property("channel", "chat"),
                Edge::new("e3", "a", "b", "SAID").with_property("channel", "voice"),
                Edge::new("e4", "b", "a", "SAID").with_property("channel", "chat"),
            ],
        )
        .unwrap();
        let mut engine = CollapseEngine::new();
        let view = engine
            .collapse(
                &snapshot,
                &Selection::everything(&snapshot),
                &CollapseConfig::default(),
                &CollapseConfig::new(group_by(&["channel"])),
            )
            .clone();

        let rep_id = eid("collapsed-edge:1");
        assert_eq!(
            view.edges,
            BTreeSet::from([rep_id.clone(), eid("e3"), eid("e4")])
        );
        let rep = engine.representative_edge(&rep_id).unwrap();
        assert_eq!(rep.multiplicity, 2);
        assert_eq!(rep.edge.label, "SAID");
        assert_eq!(rep.edge.property("channel"), Some("chat"));
        assert_eq!(rep.group_key.to_string(), "a|b|chat");

        assert_eq!(engine.expand_edge(&rep_id), Some(vec![eid("e1"), eid("e2")]));
        assert_eq!(engine.view().edges, Selection::everything(&snapshot).edges);
        assert!(engine.groups(EntityKind::Edge).is_empty());
    }

    #[test]
    fn test_collapse_edges_on_node_collapsed_view() {
        let snapshot = GraphSnapshot::load(
            vec![
                Node::new("a").with_property("k", "1"),
                Node::new("b").with_property("k", "1"),
                Node::new("c").with_property("k", "2"),
                Node::new("d").with_property("k", "3"),
            ],
            vec![
                Edge::new("ac", "a", "c", "R"),
                Edge::new("cd1", "c", "d", "R"),
                Edge::new("cd2", "c", "d", "R"),
            ],
        )
        .unwrap();
        let mut engine = CollapseEngine::new();
        engine.collapse_nodes(&snapshot, &Selection::everything(&snapshot), &group_by(&["k"]));
        let view = engine.collapse_edges(&snapshot, &[]).clone();
        assert!(view.edges.contains(&eid("cd1")));

        let view = engine.collapse_edges(&snapshot, &group_by(&["w"])).clone();
        assert_eq!(
            view.edges,
            BTreeSet::from([eid("collapsed-edge:1"), eid("reroute:1")])
        );
        // Grouping again replaces the earlier edge group.
        let view = engine.collapse_edges(&snapshot, &group_by(&["w"])).clone();
        assert_eq!(engine.groups(EntityKind::Edge).len(), 1);
        assert_eq!(view.edges.len(), 2);
        assert_eq!(engine.groups(EntityKind::Node).len(), 1);
    }

    #[test]
    fn test_expand_all_restores_candidate() {
        let snapshot = scenario_a();
        let all = Selection::everything(&snapshot);
        let mut engine = CollapseEngine::new();
        engine.collapse(
            &snapshot,
            &all,
            &CollapseConfig::new(group_by(&["type"])),
            &CollapseConfig::new(group_by(&["weight"])),
        );
        let (nodes, _) = engine.expand_all(&snapshot);
        assert_eq!(nodes, vec![nid("a"), nid("b")]);
        assert_eq!(engine.view().nodes, all.nodes);
        assert_eq!(engine.view().edges, all.edges);
        assert!(!engine.is_collapsed());
    }

    fn arb_graph() -> impl Strategy<Value = GraphSnapshot> {
        (
            proptest::collection::vec(0u8..3, 1..10),
            proptest::collection::vec((0usize..10, 0usize..10, 0u8..2), 0..25),
        )
            .prop_map(|(kinds, pairs)| {
                let n = kinds.len();
                let nodes = kinds
                    .iter()
                    .enumerate()
                    .map(|(i, k)| Node::new(format!("n{i}")).with_property("k", k.to_string()));
                let edges = pairs.into_iter().enumerate().map(|(i, (f, t, l))| {
                    Edge::new(
                        format!("e{i}"),
                        format!("n{}", f % n),
                        format!("n{}", t % n),
                        format!("L{l}"),
                    )
                });
                GraphSnapshot::load(nodes, edges).unwrap()
            })
    }

    proptest! {
        #[test]
        fn prop_expand_is_left_inverse(snapshot in arb_graph()) {
            let all = Selection::everything(&snapshot);
            let mut engine = CollapseEngine::new();
            let collapsed = engine.collapse_nodes(&snapshot, &all, &group_by(&["k"])).clone();
            let reps: Vec<NodeId> = engine.representatives().map(|r| r.node.id.clone()).collect();
            for rep in reps {
                prop_assert!(engine.expand(&snapshot, &rep).is_some());
            }
            prop_assert_eq!(&engine.view().nodes, &all.nodes);
            prop_assert_eq!(&engine.view().edges, &all.edges);

            // Re-collapsing the restored set reproduces the same grouping.
            let again = engine.collapse_nodes(&snapshot, &all, &group_by(&["k"])).clone();
            prop_assert_eq!(collapsed, again);
        }

        #[test]
        fn prop_reroute_multiplicity_counts_every_external_edge(snapshot in arb_graph()) {
            let all = Selection::everything(&snapshot);
            let mut engine = CollapseEngine::new();
            engine.collapse_nodes(&snapshot, &all, &group_by(&["k"]));

            let summarised: usize = engine.reroutes().map(|r| r.multiplicity).sum();
            let external = snapshot
                .edges()
                .filter(|e| {
                    let from = engine.representative_of(&e.from);
                    let to = engine.representative_of(&e.to);
                    (from.is_some() || to.is_some()) && from != to
                })
                .count();
            prop_assert_eq!(summarised, external);

            for reroute in engine.reroutes() {
                prop_assert_eq!(reroute.multiplicity, reroute.original_edge_ids.len());
            }
        }
    }
}
