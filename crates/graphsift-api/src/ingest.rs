//! Turning a backend query response into a [`GraphSnapshot`].

use crate::dto::{CypherEdge, CypherNode, CypherResponse};
use crate::errors::ApiError;
use graphsift_core::{Edge, EdgeId, Node, NodeId, PropertyMap};
use graphsift_graph::{GraphSnapshot, LoadReport};
use serde_json::{Map, Value};

const NAME_PROPERTIES: [&str; 3] = ["name", "title", "label"];

/// String form of a JSON value. `null` has none and is dropped by callers.
pub fn coerce_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn coerce_properties(properties: &Map<String, Value>) -> PropertyMap {
    properties
        .iter()
        .filter_map(|(key, value)| coerce_value(value).map(|v| (key.clone(), v)))
        .collect()
}

/// `name`, `title` or `label` property, else the first label, else the id.
pub fn display_name_for(node: &Node) -> String {
    NAME_PROPERTIES
        .iter()
        .find_map(|key| node.property(key).filter(|v| !v.is_empty()))
        .map(str::to_string)
        .or_else(|| node.labels.iter().next().cloned())
        .unwrap_or_else(|| node.id.0.clone())
}

fn convert_node(raw: &CypherNode) -> Option<Node> {
    let Some(id) = coerce_value(&raw.id) else {
        tracing::warn!("Skipping node without id");
        return None;
    };
    let mut node = Node::new(id);
    node.labels = raw.labels.iter().cloned().collect();
    node.properties = coerce_properties(&raw.properties);
    node.display_name = display_name_for(&node);
    Some(node)
}

fn convert_edge(raw: &CypherEdge) -> Option<Edge> {
    let (Some(id), Some(from), Some(to)) = (
        coerce_value(&raw.id),
        coerce_value(&raw.from),
        coerce_value(&raw.to),
    ) else {
        tracing::warn!("Skipping edge with null id or endpoint");
        return None;
    };
    Some(Edge {
        id: EdgeId(id),
        from: NodeId(from),
        to: NodeId(to),
        label: raw.label.clone(),
        properties: coerce_properties(&raw.properties),
    })
}

impl CypherResponse {
    /// Build a snapshot, dropping edges whose endpoints were not returned.
    pub fn into_snapshot(self) -> Result<(GraphSnapshot, LoadReport), ApiError> {
        if !self.success {
            return Err(ApiError::query_failed(
                self.error
                    .unwrap_or_else(|| "graph query was not successful".to_string()),
            ));
        }
        let nodes: Vec<Node> = self.nodes.iter().filter_map(convert_node).collect();
        let edges: Vec<Edge> = self.edges.iter().filter_map(convert_edge).collect();
        let (snapshot, report) = GraphSnapshot::load_lossy(nodes, edges);
        tracing::info!(
            "Ingested {} nodes and {} edges ({} edges dropped)",
            snapshot.node_count(),
            snapshot.edge_count(),
            report.dropped_edges.len()
        );
        Ok((snapshot, report))
    }
}
