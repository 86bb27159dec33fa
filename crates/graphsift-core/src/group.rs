use serde::{Deserialize, Serialize};
use std::fmt;

/// Display form of a grouping property the entity does not have.
pub const MISSING_VALUE_SENTINEL: &str = "null";

/// Ordered tuple of property values that identifies a collapse group.
///
/// Components are compared structurally, so values containing `|` never
/// alias another tuple. A missing property is `None`, which is distinct from
/// a property whose value is literally `"null"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(pub Vec<Option<String>>);

impl GroupKey {
    pub fn from_values<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        Self(values.into_iter().map(|v| v.map(str::to_string)).collect())
    }

    pub fn components(&self) -> &[Option<String>] {
        &self.0
    }

    pub fn is_all_missing(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|v| v.as_deref().unwrap_or(MISSING_VALUE_SENTINEL))
            .collect::<Vec<_>>()
            .join("|");
        f.write_str(&joined)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollapsedGroup {
    pub group_key: GroupKey,
    pub representative_id: String,
    pub member_ids: Vec<String>,
}
