//! Cross-resource reference expressions.
//!
//! A string anywhere in a resource's configuration may embed
//! `${resources.<group>.<key>.<field>}`. Only `id` is resolvable: it is
//! substituted with the referenced resource's remote identifier once known.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::error::ConfigError;

use super::node::ResourceNode;

/// Broad match for anything that looks like a resource reference.
static REFERENCE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$\{(resources\.[^}]*)\}").ok());

/// Valid group and key names.
static NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").ok());

/// Field that can be resolved from state.
pub const ID_FIELD: &str = "id";

/// A parsed reference expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// The full `${...}` expression as written.
    pub expression: String,
    /// Referenced resource.
    pub target: ResourceNode,
    /// Referenced field, possibly dotted.
    pub field: String,
}

impl Reference {
    /// Parses the inside of `${...}`, e.g. `resources.jobs.a.id`.
    #[must_use]
    pub fn parse(inner: &str) -> Option<Self> {
        let mut parts = inner.splitn(4, '.');
        let (Some("resources"), Some(group), Some(key), Some(field)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return None;
        };
        let valid = |s: &str| NAME_PATTERN.as_ref().is_some_and(|re| re.is_match(s));
        if !valid(group) || !valid(key) || field.is_empty() || field.split('.').any(str::is_empty) {
            return None;
        }
        Some(Self {
            expression: format!("${{{inner}}}"),
            target: ResourceNode::new(group, key),
            field: field.to_string(),
        })
    }

    /// Returns true if this reference can be resolved.
    #[must_use]
    pub fn is_resolvable(&self) -> bool {
        self.field == ID_FIELD
    }
}

/// Finds every reference in a string.
///
/// # Errors
///
/// Returns [`ConfigError::MalformedReference`] for a `${resources...}`
/// expression that does not name a group, key and field.
pub fn find_references(text: &str, owner: &ResourceNode) -> Result<Vec<Reference>, ConfigError> {
    let Some(pattern) = REFERENCE_PATTERN.as_ref() else {
        return Ok(Vec::new());
    };
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|inner| {
            Reference::parse(inner.as_str()).ok_or_else(|| ConfigError::MalformedReference {
                expression: format!("${{{}}}", inner.as_str()),
                node: owner.to_string(),
            })
        })
        .collect()
}

/// Collects references from every string inside a value, in document order.
///
/// # Errors
///
/// Returns the first malformed reference found.
pub fn collect_references(value: &Value, owner: &ResourceNode) -> Result<Vec<Reference>, ConfigError> {
    let mut out = Vec::new();
    collect_into(value, owner, &mut out)?;
    Ok(out)
}

fn collect_into(value: &Value, owner: &ResourceNode, out: &mut Vec<Reference>) -> Result<(), ConfigError> {
    match value {
        Value::String(s) => {
            for reference in find_references(s, owner)? {
                if !out.contains(&reference) {
                    out.push(reference);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_into(item, owner, out)?;
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_into(item, owner, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Lists reference expressions still present in a value.
#[must_use]
pub fn unresolved_references(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    unresolved_into(value, &mut out);
    out
}

fn unresolved_into(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            if let Some(pattern) = REFERENCE_PATTERN.as_ref() {
                for m in pattern.find_iter(s) {
                    let expression = m.as_str().to_string();
                    if !out.contains(&expression) {
                        out.push(expression);
                    }
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| unresolved_into(item, out)),
        Value::Object(map) => map.values().for_each(|item| unresolved_into(item, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owner() -> ResourceNode {
        ResourceNode::new("jobs", "consumer")
    }

    #[test]
    fn test_parse() {
        let r = Reference::parse("resources.schemas.raw.id").expect("valid");
        assert_eq!(r.target, ResourceNode::new("schemas", "raw"));
        assert_eq!(r.field, "id");
        assert_eq!(r.expression, "${resources.schemas.raw.id}");
        assert!(r.is_resolvable());

        let nested = Reference::parse("resources.jobs.a.settings.name").expect("valid");
        assert_eq!(nested.field, "settings.name");
        assert!(!nested.is_resolvable());

        assert!(Reference::parse("resources.jobs.a").is_none());
        assert!(Reference::parse("resources.jobs..id").is_none());
        assert!(Reference::parse("resources.jo bs.a.id").is_none());
    }

    #[test]
    fn test_find_embedded() {
        let refs = find_references(
            "/Volumes/${resources.schemas.raw.id}/${resources.volumes.files.id}/x",
            &owner(),
        )
        .expect("valid");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[1].target, ResourceNode::new("volumes", "files"));
    }

    #[test]
    fn test_malformed() {
        let err = find_references("${resources.jobs}", &owner()).expect_err("malformed");
        assert!(matches!(err, ConfigError::MalformedReference { .. }));
        assert!(find_references("${var.x} and plain text", &owner()).expect("ok").is_empty());
    }

    #[test]
    fn test_collect_and_unresolved() {
        let value = json!({
            "schema": "${resources.schemas.raw.id}",
            "tasks": [{"path": "${resources.schemas.raw.id}/nb"}, {"n": 1}]
        });
        let refs = collect_references(&value, &owner()).expect("valid");
        assert_eq!(refs.len(), 1);
        assert_eq!(
            unresolved_references(&value),
            vec!["${resources.schemas.raw.id}".to_string()]
        );
        assert!(unresolved_references(&json!({"schema": "main.raw"})).is_empty());
    }
}
