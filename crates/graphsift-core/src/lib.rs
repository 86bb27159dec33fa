use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod filter;
pub mod group;

pub use filter::{CollapseConfig, Predicate, SessionFilterConfig, TimeRangeConfig};
pub use group::{CollapsedGroup, GroupKey, MISSING_VALUE_SENTINEL};

/// Property values are coerced to strings when a graph is ingested.
pub type PropertyMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub String);

impl EdgeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Error type for enum conversion failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnumConversionError {
    #[error("Invalid Operator value: {0}")]
    InvalidOperator(String),
    #[error("Invalid SessionMode value: {0}")]
    InvalidSessionMode(String),
    #[error("Invalid EntityKind value: {0}")]
    InvalidEntityKind(String),
}

/// Which half of the graph a predicate or collapse config applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Node,
    Edge,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Edge => "edge",
        }
    }
}

impl FromStr for EntityKind {
    type Err = EnumConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "node" | "nodes" => Ok(Self::Node),
            "edge" | "edges" => Ok(Self::Edge),
            other => Err(EnumConversionError::InvalidEntityKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operator {
    Equals,
    Contains,
    Regex,
    Exists,
    NotExists,
    Greater,
    Less,
}

impl Operator {
    pub const ALL: [Operator; 7] = [
        Operator::Equals,
        Operator::Contains,
        Operator::Regex,
        Operator::Exists,
        Operator::NotExists,
        Operator::Greater,
        Operator::Less,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::Contains => "contains",
            Self::Regex => "regex",
            Self::Exists => "exists",
            Self::NotExists => "not-exists",
            Self::Greater => "greater",
            Self::Less => "less",
        }
    }

    /// `exists` and `not-exists` ignore the predicate value.
    pub fn takes_value(self) -> bool {
        !matches!(self, Self::Exists | Self::NotExists)
    }
}

impl FromStr for Operator {
    type Err = EnumConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == normalized)
            .ok_or(EnumConversionError::InvalidOperator(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    #[default]
    All,
    SessionOnly,
    SessionRecent,
    Inferred,
    Hybrid,
    DirectOnly,
    TimeRange,
}

impl SessionMode {
    pub const ALL: [SessionMode; 7] = [
        SessionMode::All,
        SessionMode::SessionOnly,
        SessionMode::SessionRecent,
        SessionMode::Inferred,
        SessionMode::Hybrid,
        SessionMode::DirectOnly,
        SessionMode::TimeRange,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::SessionOnly => "session-only",
            Self::SessionRecent => "session-recent",
            Self::Inferred => "inferred",
            Self::Hybrid => "hybrid",
            Self::DirectOnly => "direct-only",
            Self::TimeRange => "time-range",
        }
    }

    /// Modes that select relative to `selected_session_id`.
    pub fn requires_session(self) -> bool {
        matches!(
            self,
            Self::SessionOnly | Self::SessionRecent | Self::Hybrid | Self::DirectOnly
        )
    }
}

impl FromStr for SessionMode {
    type Err = EnumConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or(EnumConversionError::InvalidSessionMode(value.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub properties: PropertyMap,
    #[serde(default)]
    pub display_name: String,
}

impl Node {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id: NodeId(id),
            labels: BTreeSet::new(),
            properties: PropertyMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Labels joined by comma, the form predicates see for the reserved `labels` field.
    pub fn joined_labels(&self) -> String {
        self.labels.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    /// Relationship type, e.g. `MENTIONS` or `INF_REL_SIMILAR`.
    #[serde(default, alias = "type")]
    pub label: String,
    #[serde(default)]
    pub properties: PropertyMap,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: EdgeId(id.into()),
            from: NodeId(from.into()),
            to: NodeId(to.into()),
            label: label.into(),
            properties: PropertyMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn touches(&self, node: &NodeId) -> bool {
        &self.from == node || &self.to == node
    }

    /// The far end of the edge as seen from `node`, if the edge touches it.
    pub fn other_end(&self, node: &NodeId) -> Option<&NodeId> {
        if &self.from == node {
            Some(&self.to)
        } else if &self.to == node {
            Some(&self.from)
        } else {
            None
        }
    }
}
