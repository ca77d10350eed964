//! Persisted state document.
//!
//! One JSON document records, for every deployed resource, the remote
//! identifier and the snapshot last applied to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::ResourceNode;

/// Current version of the state format.
pub const STATE_VERSION: u32 = 1;

/// Recorded state of one deployed resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    /// Remote identifier.
    #[serde(rename = "__id__")]
    pub id: String,
    /// Snapshot last applied.
    pub state: Value,
}

/// The complete state document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    /// State format version.
    #[serde(default = "default_version")]
    pub state_version: u32,
    /// Stable identifier of this document's history.
    pub lineage: String,
    /// Incremented on every write.
    pub serial: u64,
    /// When the document was last written.
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
    /// Entries by group, then by resource key.
    #[serde(default)]
    pub resources: BTreeMap<String, BTreeMap<String, ResourceEntry>>,
}

const fn default_version() -> u32 {
    STATE_VERSION
}

impl Default for StateDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl StateDocument {
    /// Creates an empty document with a fresh lineage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state_version: STATE_VERSION,
            lineage: Uuid::new_v4().to_string(),
            serial: 0,
            last_updated: Utc::now(),
            resources: BTreeMap::new(),
        }
    }

    /// Gets the entry for a node.
    #[must_use]
    pub fn get(&self, node: &ResourceNode) -> Option<&ResourceEntry> {
        self.resources.get(&node.group)?.get(&node.key)
    }

    /// Inserts or replaces the entry for a node.
    pub fn set(&mut self, node: &ResourceNode, entry: ResourceEntry) {
        self.resources
            .entry(node.group.clone())
            .or_default()
            .insert(node.key.clone(), entry);
    }

    /// Removes the entry for a node, dropping the group when it empties.
    pub fn remove(&mut self, node: &ResourceNode) -> Option<ResourceEntry> {
        let group = self.resources.get_mut(&node.group)?;
        let removed = group.remove(&node.key);
        if group.is_empty() {
            self.resources.remove(&node.group);
        }
        removed
    }

    /// Iterates over all entries in group, then key, order.
    pub fn entries(&self) -> impl Iterator<Item = (ResourceNode, &ResourceEntry)> {
        self.resources.iter().flat_map(|(group, entries)| {
            entries
                .iter()
                .map(move |(key, entry)| (ResourceNode::new(group.as_str(), key.as_str()), entry))
        })
    }

    /// Number of recorded resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.values().map(BTreeMap::len).sum()
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_wire_format() {
        let mut doc = StateDocument::new();
        doc.set(
            &ResourceNode::new("jobs", "nightly"),
            ResourceEntry { id: "123".into(), state: json!({"name": "nightly"}) },
        );

        let value = serde_json::to_value(&doc).expect("serialize");
        assert_eq!(value["resources"]["jobs"]["nightly"]["__id__"], "123");
        assert_eq!(value["resources"]["jobs"]["nightly"]["state"]["name"], "nightly");
        assert_eq!(value["serial"], 0);
        assert!(Uuid::parse_str(value["lineage"].as_str().expect("lineage")).is_ok());
    }

    #[test]
    fn test_remove_drops_empty_group() {
        let node = ResourceNode::new("jobs", "a");
        let mut doc = StateDocument::new();
        doc.set(&node, ResourceEntry { id: "1".into(), state: Value::Null });
        assert_eq!(doc.len(), 1);

        let removed = doc.remove(&node).expect("entry");
        assert_eq!(removed.id, "1");
        assert!(doc.is_empty());
        assert!(doc.remove(&node).is_none());
    }

    #[test]
    fn test_minimal_document_parses() {
        let doc: StateDocument =
            serde_json::from_str(r#"{"lineage": "abc", "serial": 7}"#).expect("parse");
        assert_eq!(doc.serial, 7);
        assert_eq!(doc.state_version, STATE_VERSION);
        assert!(doc.is_empty());
    }
}
