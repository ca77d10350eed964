//! Configuration hashing for change detection.
//!
//! Hashes are computed over canonical JSON: object keys are emitted in
//! sorted order, so the same tree always hashes the same way.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::tree::ConfigTree;

/// Hasher for computing configuration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of a whole configuration value.
    #[must_use]
    pub fn hash_value(&self, value: &Value) -> String {
        let mut hasher = Sha256::new();
        feed(&mut hasher, value);
        hex::encode(hasher.finalize())
    }

    /// Computes a hash of the `resources` section of a tree.
    ///
    /// Settings outside `resources` do not affect what gets deployed.
    #[must_use]
    pub fn hash_tree(&self, tree: &ConfigTree) -> String {
        self.hash_value(&tree.get("resources").unwrap_or(Value::Null))
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}

/// Feeds a value into the hasher with a type tag per node.
fn feed(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update([0u8]),
        Value::Bool(b) => hasher.update([1u8, u8::from(*b)]),
        Value::Number(n) => {
            hasher.update([2u8]);
            hasher.update(n.to_string().as_bytes());
        }
        Value::String(s) => {
            hasher.update([3u8]);
            hasher.update((s.len() as u64).to_be_bytes());
            hasher.update(s.as_bytes());
        }
        Value::Array(items) => {
            hasher.update([4u8]);
            hasher.update((items.len() as u64).to_be_bytes());
            for item in items {
                feed(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.update([5u8]);
            hasher.update((map.len() as u64).to_be_bytes());
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort_unstable();
            for key in keys {
                hasher.update((key.len() as u64).to_be_bytes());
                hasher.update(key.as_bytes());
                feed(hasher, &map[key]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_deterministic() {
        let hasher = ConfigHasher::new();
        let a = json!({"name": "x", "tags": {"b": 1, "a": 2}});
        let b = json!({"tags": {"a": 2, "b": 1}, "name": "x"});
        assert_eq!(hasher.hash_value(&a), hasher.hash_value(&b));
        assert_eq!(hasher.hash_value(&a).len(), 64);
    }

    #[test]
    fn test_hash_distinguishes_types() {
        let hasher = ConfigHasher::new();
        assert_ne!(hasher.hash_value(&json!("1")), hasher.hash_value(&json!(1)));
        assert_ne!(hasher.hash_value(&json!(["ab"])), hasher.hash_value(&json!(["a", "b"])));
    }

    #[test]
    fn test_hash_tree_ignores_bundle_section() {
        let hasher = ConfigHasher::new();
        let a = ConfigTree::new(json!({"bundle": {"name": "a"}, "resources": {"jobs": {"j": {}}}}));
        let b = ConfigTree::new(json!({"bundle": {"name": "b"}, "resources": {"jobs": {"j": {}}}}));
        assert_eq!(hasher.hash_tree(&a), hasher.hash_tree(&b));
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        assert_eq!(hasher.short_hash("abcdef1234567890"), "abcdef12");
    }
}
