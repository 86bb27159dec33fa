use crate::{Operator, SessionMode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub property: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Predicate {
    pub fn new(property: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            operator,
            value: value.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFilterConfig {
    pub mode: SessionMode,
    pub selected_session_id: Option<String>,
}

impl SessionFilterConfig {
    /// The selected session, treating an empty id as no selection.
    pub fn session(&self) -> Option<&str> {
        self.selected_session_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }
}

/// Epoch-millisecond bounds for the `time-range` session mode.
///
/// `min_time`/`max_time` are what discovery found in the graph; `start_time`/`end_time`
/// are the window the user selected inside those bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRangeConfig {
    pub property_name: Option<String>,
    pub min_time: i64,
    pub max_time: i64,
    pub start_time: i64,
    pub end_time: i64,
}

impl TimeRangeConfig {
    pub fn discovered(property_name: impl Into<String>, min_time: i64, max_time: i64) -> Self {
        Self {
            property_name: Some(property_name.into()),
            min_time,
            max_time,
            start_time: min_time,
            end_time: max_time,
        }
    }

    pub fn contains(&self, timestamp_ms: i64) -> bool {
        timestamp_ms >= self.start_time && timestamp_ms <= self.end_time
    }

    /// Keep the selected window inside the discovered bounds; an inverted or
    /// fully out-of-bounds window resets to the full range.
    pub fn clamp_window(&mut self) {
        if self.min_time > self.max_time {
            std::mem::swap(&mut self.min_time, &mut self.max_time);
        }
        let start = self.start_time.clamp(self.min_time, self.max_time);
        let end = self.end_time.clamp(self.min_time, self.max_time);
        if start > end || (self.start_time > self.max_time || self.end_time < self.min_time) {
            self.start_time = self.min_time;
            self.end_time = self.max_time;
        } else {
            self.start_time = start;
            self.end_time = end;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollapseConfig {
    pub enabled: bool,
    pub group_by: Vec<String>,
}

impl CollapseConfig {
    pub fn new(group_by: Vec<String>) -> Self {
        Self {
            enabled: true,
            group_by,
        }
    }

    /// Collapse only runs when enabled with at least one grouping property.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.group_by.is_empty()
    }
}
