//! Scans a freshly loaded snapshot for the values filter controls offer:
//! property names, sessions and the time bounds.

use crate::session::session_of;
use crate::snapshot::GraphSnapshot;
use crate::time::parse_timestamp_ms;
use graphsift_core::{EntityKind, PropertyMap, TimeRangeConfig};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Candidate node properties holding a timestamp, tried in order.
pub const DEFAULT_TIME_FIELDS: [&str; 6] = [
    "created_at",
    "createdAt",
    "timestamp",
    "updated_at",
    "time",
    "date",
];

const MAX_SAMPLE_VALUES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySummary {
    pub name: String,
    /// Up to twenty distinct values, sorted.
    pub distinct_values: Vec<String>,
    /// Entities carrying the property.
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub node_count: usize,
}

#[derive(Default)]
struct Tally {
    values: BTreeSet<String>,
    count: usize,
}

fn summarize<'a>(maps: impl Iterator<Item = &'a PropertyMap>) -> Vec<PropertySummary> {
    let mut tallies: BTreeMap<&str, Tally> = BTreeMap::new();
    for properties in maps {
        for (name, value) in properties {
            let tally = tallies.entry(name.as_str()).or_default();
            tally.count += 1;
            if tally.values.len() < MAX_SAMPLE_VALUES {
                tally.values.insert(value.clone());
            }
        }
    }
    tallies
        .into_iter()
        .map(|(name, tally)| PropertySummary {
            name: name.to_string(),
            distinct_values: tally.values.into_iter().collect(),
            count: tally.count,
        })
        .collect()
}

/// Property names present on nodes or edges, sorted by name.
pub fn available_properties(snapshot: &GraphSnapshot, kind: EntityKind) -> Vec<PropertySummary> {
    match kind {
        EntityKind::Node => summarize(snapshot.nodes().map(|n| &n.properties)),
        EntityKind::Edge => summarize(snapshot.edges().map(|e| &e.properties)),
    }
}

/// Distinct sessions with their node counts, sorted by id.
pub fn discover_sessions(snapshot: &GraphSnapshot) -> Vec<SessionSummary> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for node in snapshot.nodes() {
        if let Some(session) = session_of(node).filter(|s| !s.trim().is_empty()) {
            *counts.entry(session).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .map(|(id, node_count)| SessionSummary {
            id: id.to_string(),
            node_count,
        })
        .collect()
}

/// Bounds of the first candidate field with at least one parsable node value.
/// The window starts out covering the whole range.
pub fn discover_time_range(
    snapshot: &GraphSnapshot,
    candidates: &[&str],
) -> Option<TimeRangeConfig> {
    candidates.iter().find_map(|field| {
        let (min, max) = snapshot
            .nodes()
            .filter_map(|node| node.property(field).and_then(parse_timestamp_ms))
            .fold(None, |bounds: Option<(i64, i64)>, ts| match bounds {
                None => Some((ts, ts)),
                Some((lo, hi)) => Some((lo.min(ts), hi.max(ts))),
            })?;
        tracing::debug!("Discovered time property {} spanning {}..={}", field, min, max);
        Some(TimeRangeConfig::discovered(*field, min, max))
    })
}
