//! Desired-state configuration tree.
//!
//! The rendered bundle configuration is held as one JSON tree behind a
//! read/write lock. Planning and apply tasks read resource configs from it
//! concurrently; the only writes are reference substitutions made by the
//! node that produced the value, before any dependent reads it.

use serde_json::{Map, Value};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{ConfigError, Result};

use super::node::ResourceNode;

/// One step of a dotted tree path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step<'a> {
    Key(&'a str),
    Index(usize),
}

/// Parses `a.b[0].c` into steps.
fn parse_path(path: &str) -> Result<Vec<Step<'_>>> {
    let mut steps = Vec::new();
    for part in path.split('.') {
        let (key, mut rest) = part.split_once('[').map_or((part, ""), |(k, r)| (k, r));
        if key.is_empty() && steps.is_empty() && rest.is_empty() {
            return Err(ConfigError::validation(format!("Invalid path '{path}'"), path).into());
        }
        if !key.is_empty() {
            steps.push(Step::Key(key));
        }
        while !rest.is_empty() {
            let (index, tail) = rest
                .split_once(']')
                .ok_or_else(|| ConfigError::validation(format!("Unclosed index in path '{path}'"), path))?;
            let index = index
                .parse()
                .map_err(|_| ConfigError::validation(format!("Invalid index in path '{path}'"), path))?;
            steps.push(Step::Index(index));
            rest = tail.strip_prefix('[').unwrap_or(tail);
        }
    }
    Ok(steps)
}

/// Lock-guarded desired configuration.
#[derive(Debug, Default)]
pub struct ConfigTree {
    root: RwLock<Value>,
}

impl ConfigTree {
    /// Wraps a rendered configuration value.
    #[must_use]
    pub const fn new(root: Value) -> Self {
        Self {
            root: RwLock::new(root),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.root.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Value> {
        self.root.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of the value at a dotted path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Value> {
        let steps = parse_path(path).ok()?;
        let root = self.read();
        let mut current = &*root;
        for step in steps {
            current = match step {
                Step::Key(key) => current.get(key)?,
                Step::Index(idx) => current.get(idx)?,
            };
        }
        Some(current.clone())
    }

    /// Sets the value at a dotted path, creating intermediate objects.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid, crosses a non-container
    /// value, or indexes past the end of a sequence.
    pub fn set(&self, path: &str, value: Value) -> Result<()> {
        let steps = parse_path(path)?;
        let mut root = self.write();
        let mut current = &mut *root;
        for step in steps {
            current = match step {
                Step::Key(key) => {
                    if current.is_null() {
                        *current = Value::Object(Map::new());
                    }
                    let Value::Object(map) = current else {
                        return Err(ConfigError::validation(
                            format!("Cannot set '{path}': '{key}' is not inside an object"),
                            path,
                        )
                        .into());
                    };
                    map.entry(key).or_insert(Value::Null)
                }
                Step::Index(idx) => current.get_mut(idx).ok_or_else(|| {
                    ConfigError::validation(format!("Cannot set '{path}': index {idx} out of range"), path)
                })?,
            };
        }
        *current = value;
        Ok(())
    }

    /// Lists declared resources as `resources.<group>.<key>`.
    #[must_use]
    pub fn resource_nodes(&self) -> Vec<ResourceNode> {
        let root = self.read();
        let Some(Value::Object(groups)) = root.get("resources") else {
            return Vec::new();
        };
        groups
            .iter()
            .filter_map(|(group, entries)| entries.as_object().map(|m| (group, m)))
            .flat_map(|(group, entries)| entries.keys().map(move |key| ResourceNode::new(group.as_str(), key.as_str())))
            .collect()
    }

    /// Returns true if the resource is declared.
    #[must_use]
    pub fn contains(&self, node: &ResourceNode) -> bool {
        self.read()
            .get("resources")
            .and_then(|r| r.get(&node.group))
            .and_then(|g| g.get(&node.key))
            .is_some()
    }

    /// Returns a copy of a resource's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingResource`] if it is not declared.
    pub fn resource_config(&self, node: &ResourceNode) -> Result<Value> {
        self.read()
            .get("resources")
            .and_then(|r| r.get(&node.group))
            .and_then(|g| g.get(&node.key))
            .cloned()
            .ok_or_else(|| ConfigError::MissingResource { node: node.to_string() }.into())
    }

    /// Replaces `expression` with `replacement` inside every string value.
    ///
    /// A string consisting only of the expression becomes the replacement;
    /// embedded occurrences are substituted in place. Returns the number of
    /// strings changed.
    pub fn replace_reference(&self, expression: &str, replacement: &str) -> usize {
        let mut root = self.write();
        replace_in(&mut root, expression, replacement)
    }

    /// Returns a copy of the whole tree.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        self.read().clone()
    }
}

fn replace_in(value: &mut Value, expression: &str, replacement: &str) -> usize {
    match value {
        Value::String(s) if s.contains(expression) => {
            *s = s.replace(expression, replacement);
            1
        }
        Value::Array(items) => items
            .iter_mut()
            .map(|item| replace_in(item, expression, replacement))
            .sum(),
        Value::Object(map) => map
            .values_mut()
            .map(|item| replace_in(item, expression, replacement))
            .sum(),
        _ => 0,
    }
}
