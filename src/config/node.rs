//! Resource node identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A declared resource: `resources.<group>.<key>` in the configuration tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Resource group, e.g. `jobs` or `schemas`.
    pub group: String,
    /// Resource key within the group.
    pub key: String,
}

impl ResourceNode {
    /// Creates a node.
    #[must_use]
    pub fn new(group: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            key: key.into(),
        }
    }

    /// Parses `group.key`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let (group, key) = text.split_once('.')?;
        if group.is_empty() || key.is_empty() || key.contains('.') {
            return None;
        }
        Some(Self::new(group, key))
    }

    /// Dotted path of this resource's configuration.
    #[must_use]
    pub fn config_path(&self) -> String {
        format!("resources.{}.{}", self.group, self.key)
    }

    /// Reference expression for one of this resource's fields.
    #[must_use]
    pub fn reference(&self, field: &str) -> String {
        format!("${{resources.{}.{}.{field}}}", self.group, self.key)
    }
}

impl fmt::Display for ResourceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendering() {
        let node = ResourceNode::new("jobs", "nightly");
        assert_eq!(node.to_string(), "jobs.nightly");
        assert_eq!(node.config_path(), "resources.jobs.nightly");
        assert_eq!(node.reference("id"), "${resources.jobs.nightly.id}");
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            ResourceNode::parse("schemas.raw"),
            Some(ResourceNode::new("schemas", "raw"))
        );
        assert_eq!(ResourceNode::parse("schemas"), None);
        assert_eq!(ResourceNode::parse("a.b.c"), None);
        assert_eq!(ResourceNode::parse(".b"), None);
    }
}
