//! Snapshot document types.
//!
//! On disk a snapshot is one JSON object keyed by cache key:
//!
//! ```json
//! {
//!   "session": {
//!     "value": { "user": 7 },
//!     "expiresAt": 1735689600000
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One persisted entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Absent in files that stored an undefined value; decodes as `null`
    #[serde(default)]
    pub value: Value,
    /// Absolute expiry in Unix milliseconds, `null` when the entry never expires
    #[serde(rename = "expiresAt", default)]
    pub expires_at: Option<i64>,
}

/// Full table snapshot. Keys are kept sorted so rewrites are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    pub entries: BTreeMap<String, SnapshotEntry>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value, expires_at: Option<i64>) {
        self.entries
            .insert(key.into(), SnapshotEntry { value, expires_at });
    }

    pub fn get(&self, key: &str) -> Option<&SnapshotEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Snapshot {
    type Item = (String, SnapshotEntry);
    type IntoIter = std::collections::btree_map::IntoIter<String, SnapshotEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
