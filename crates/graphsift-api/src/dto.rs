use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub preview: Option<String>,
}

/// Body of `GET /sessions`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionsResponse {
    #[serde(default)]
    pub sessions: Vec<SessionInfo>,
}

/// Body of `POST /graph/cypher`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CypherRequest {
    pub query: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Server-side row cap; the backend applies its own default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl CypherRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: Map::new(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// A node as the backend returns it. Ids and property values may be any JSON
/// scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CypherNode {
    pub id: Value,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CypherEdge {
    pub id: Value,
    #[serde(alias = "source", alias = "start")]
    pub from: Value,
    #[serde(alias = "target", alias = "end")]
    pub to: Value,
    #[serde(default, alias = "type")]
    pub label: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CypherResponse {
    pub success: bool,
    #[serde(default)]
    pub nodes: Vec<CypherNode>,
    #[serde(default)]
    pub edges: Vec<CypherEdge>,
    #[serde(default)]
    pub raw_results: Vec<Value>,
    #[serde(default)]
    pub stats: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `GET /graph/schema`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaResponse {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub relationship_types: Vec<String>,
    #[serde(default)]
    pub property_keys: Vec<String>,
}
