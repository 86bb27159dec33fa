use graphsift_core::{
    CollapseConfig, CollapsedGroup, EntityKind, GroupKey, Predicate, SessionFilterConfig,
    TimeRangeConfig,
};
use graphsift_store::{StateStore, StorageError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key the filter configuration is stored under.
pub const FILTER_STATE_KEY: &str = "graphsift.filters";

/// Where a collapsed group's representative and members were last seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub representative_id: String,
    pub member_ids: Vec<String>,
}

impl From<&CollapsedGroup> for GroupRecord {
    fn from(group: &CollapsedGroup) -> Self {
        Self {
            representative_id: group.representative_id.clone(),
            member_ids: group.member_ids.clone(),
        }
    }
}

/// Collapse configuration for one entity kind plus the groups it produced
/// on the last apply. Groups are stored as `[groupKey, record]` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapseState {
    #[serde(flatten)]
    pub config: CollapseConfig,
    #[serde(default)]
    pub collapsed: Vec<(GroupKey, GroupRecord)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapseSettings {
    pub nodes: CollapseState,
    pub edges: CollapseState,
}

impl CollapseSettings {
    pub fn get(&self, kind: EntityKind) -> &CollapseState {
        match kind {
            EntityKind::Node => &self.nodes,
            EntityKind::Edge => &self.edges,
        }
    }

    pub fn get_mut(&mut self, kind: EntityKind) -> &mut CollapseState {
        match kind {
            EntityKind::Node => &mut self.nodes,
            EntityKind::Edge => &mut self.edges,
        }
    }
}

/// Every user-editable filter setting, owned by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub session: SessionFilterConfig,
    pub time_range: TimeRangeConfig,
    pub node_properties: Vec<Predicate>,
    pub edge_properties: Vec<Predicate>,
    pub collapse: CollapseSettings,
}

impl FilterState {
    pub fn predicates(&self, kind: EntityKind) -> &Vec<Predicate> {
        match kind {
            EntityKind::Node => &self.node_properties,
            EntityKind::Edge => &self.edge_properties,
        }
    }

    pub fn predicates_mut(&mut self, kind: EntityKind) -> &mut Vec<Predicate> {
        match kind {
            EntityKind::Node => &mut self.node_properties,
            EntityKind::Edge => &mut self.edge_properties,
        }
    }
}

/// Serialize/deserialize pair for [`FilterState`].
pub struct FilterStateStore;

impl FilterStateStore {
    pub fn serialize(state: &FilterState) -> Result<String, serde_json::Error> {
        serde_json::to_string(state)
    }

    /// Merge a stored blob onto the defaults one field at a time. Anything
    /// unreadable keeps its default; this never fails.
    pub fn deserialize(blob: &str) -> FilterState {
        let mut state = FilterState::default();
        let root = match serde_json::from_str::<Value>(blob) {
            Ok(Value::Object(root)) => root,
            Ok(_) => {
                tracing::warn!("Stored filter state is not a JSON object, using defaults");
                return state;
            }
            Err(e) => {
                tracing::warn!("Stored filter state is not valid JSON ({}), using defaults", e);
                return state;
            }
        };

        if let Some(session) = root.get("session").and_then(Value::as_object) {
            merge_field(session, "mode", &mut state.session.mode);
            merge_field(session, "selectedSessionId", &mut state.session.selected_session_id);
        }
        if let Some(range) = root.get("timeRange").and_then(Value::as_object) {
            let target = &mut state.time_range;
            merge_field(range, "propertyName", &mut target.property_name);
            merge_field(range, "minTime", &mut target.min_time);
            merge_field(range, "maxTime", &mut target.max_time);
            merge_field(range, "startTime", &mut target.start_time);
            merge_field(range, "endTime", &mut target.end_time);
        }
        state.node_properties = merge_predicates(&root, "nodeProperties");
        state.edge_properties = merge_predicates(&root, "edgeProperties");

        if let Some(collapse) = root.get("collapse").and_then(Value::as_object) {
            merge_collapse(collapse, "nodes", &mut state.collapse.nodes);
            merge_collapse(collapse, "edges", &mut state.collapse.edges);
        }
        state
    }

    pub fn load(store: &dyn StateStore) -> Result<Option<FilterState>, StorageError> {
        Ok(store
            .load(FILTER_STATE_KEY)?
            .map(|blob| Self::deserialize(&blob)))
    }

    pub fn save(store: &mut dyn StateStore, state: &FilterState) -> Result<(), StorageError> {
        let blob = Self::serialize(state).map_err(|e| StorageError::Other(e.to_string()))?;
        store.save(FILTER_STATE_KEY, &blob)
    }
}

fn merge_field<T: DeserializeOwned>(object: &Map<String, Value>, key: &str, target: &mut T) {
    let Some(value) = object.get(key) else {
        return;
    };
    match serde_json::from_value::<T>(value.clone()) {
        Ok(parsed) => *target = parsed,
        Err(e) => tracing::warn!("Ignoring stored filter field {}: {}", key, e),
    }
}

fn merge_predicates(object: &Map<String, Value>, key: &str) -> Vec<Predicate> {
    let Some(entries) = object.get(key).and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value(entry.clone()) {
            Ok(predicate) => Some(predicate),
            Err(e) => {
                tracing::warn!("Skipping stored {} entry: {}", key, e);
                None
            }
        })
        .collect()
}

fn merge_collapse(object: &Map<String, Value>, key: &str, target: &mut CollapseState) {
    let Some(fields) = object.get(key).and_then(Value::as_object) else {
        return;
    };
    merge_field(fields, "enabled", &mut target.config.enabled);
    merge_field(fields, "groupBy", &mut target.config.group_by);
    merge_field(fields, "collapsed", &mut target.collapsed);
}
