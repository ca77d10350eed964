//! Configuration validation for the desired-state tree.
//!
//! Checks the shape of `resources`, resource names and reference
//! expressions before any planning work starts.

use crate::error::{ConfigError, DeployError, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::debug;

use super::node::ResourceNode;
use super::refs::{ID_FIELD, collect_references};
use super::tree::ConfigTree;

/// Regex pattern for valid group and resource names.
static NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").ok());

/// Maximum length of a resource key.
pub const MAX_NAME_LENGTH: usize = 128;

/// Validator for desired-state trees.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Groups with a registered adapter, when known.
    known_groups: Option<BTreeSet<String>>,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }
}

impl ConfigValidator {
    /// Creates a validator that accepts any resource group.
    #[must_use]
    pub const fn new() -> Self {
        Self { known_groups: None }
    }

    /// Restricts resource groups to those with a registered adapter.
    #[must_use]
    pub fn with_known_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    /// Validates a tree, collecting every problem found.
    #[must_use]
    pub fn check(&self, tree: &ConfigTree) -> ValidationResult {
        let mut result = ValidationResult::default();
        let root = tree.snapshot();

        if !root.is_object() {
            result.error("", "Configuration root must be a mapping");
            return result;
        }

        match root.get("resources") {
            None | Some(Value::Null) => {
                result.warnings.push(String::from("No resources declared"));
            }
            Some(Value::Object(groups)) => {
                for (group, entries) in groups {
                    self.validate_group(group, entries, &mut result);
                }
                Self::validate_references(tree, &mut result);
            }
            Some(_) => result.error("resources", "'resources' must be a mapping of resource groups"),
        }

        result
    }

    /// Validates a tree.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate(&self, tree: &ConfigTree) -> Result<ValidationResult> {
        let result = self.check(tree);
        if let Some(first) = result.errors.first() {
            return Err(DeployError::Config(ConfigError::ValidationError {
                message: first.message.clone(),
                field: Some(first.field.clone()),
            }));
        }
        debug!("Configuration validation passed");
        Ok(result)
    }

    fn validate_group(&self, group: &str, entries: &Value, result: &mut ValidationResult) {
        let field = format!("resources.{group}");

        if !is_valid_name(group) {
            result.error(&field, format!("Resource group '{group}' is not a valid name"));
        }
        if let Some(known) = &self.known_groups
            && !known.contains(group)
        {
            result.error(&field, format!("Unsupported resource kind '{group}'"));
        }

        let Value::Object(entries) = entries else {
            result.error(&field, format!("'{field}' must be a mapping of resources"));
            return;
        };
        if entries.is_empty() {
            result.warnings.push(format!("Resource group '{group}' is empty"));
        }

        for (key, config) in entries {
            let field = format!("{field}.{key}");
            if !is_valid_name(key) || key.len() > MAX_NAME_LENGTH {
                result.error(&field, format!("Resource name '{key}' is not a valid name"));
            }
            if !config.is_object() {
                result.error(&field, format!("'{field}' must be a mapping"));
            }
        }
    }

    fn validate_references(tree: &ConfigTree, result: &mut ValidationResult) {
        for node in tree.resource_nodes() {
            let Ok(config) = tree.resource_config(&node) else {
                continue;
            };
            let references = match collect_references(&config, &node) {
                Ok(references) => references,
                Err(e) => {
                    result.error(node.config_path(), e.to_string());
                    continue;
                }
            };
            for reference in references {
                check_reference(tree, &node, &reference.target, &reference.field, &reference.expression, result);
            }
        }
    }
}

fn check_reference(
    tree: &ConfigTree,
    node: &ResourceNode,
    target: &ResourceNode,
    field: &str,
    expression: &str,
    result: &mut ValidationResult,
) {
    let path = node.config_path();
    if target == node {
        result.error(path, format!("{node} refers to itself via {expression}"));
    } else if !tree.contains(target) {
        result.error(
            path,
            ConfigError::UndeclaredReference {
                node: node.to_string(),
                target: target.to_string(),
                expression: expression.to_string(),
            }
            .to_string(),
        );
    } else if field != ID_FIELD {
        result.error(
            path,
            ConfigError::UnsupportedReferenceField {
                node: node.to_string(),
                field: field.to_string(),
                expression: expression.to_string(),
            }
            .to_string(),
        );
    }
}

/// Checks if a name is valid for a group or resource key.
fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.as_ref().is_some_and(|re| re.is_match(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: Value) -> ConfigTree {
        ConfigTree::new(value)
    }

    #[test]
    fn test_valid_tree() {
        let t = tree(json!({
            "resources": {
                "schemas": {"raw": {"name": "raw"}},
                "jobs": {"ingest": {"schema": "${resources.schemas.raw.id}"}}
            }
        }));
        let result = ConfigValidator::new().validate(&t).expect("valid");
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_shape_errors() {
        let t = tree(json!({"resources": {"jobs": ["not", "a", "map"]}}));
        let result = ConfigValidator::new().check(&t);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, "resources.jobs");

        let t = tree(json!({"resources": {"jobs": {"bad name": {}}}}));
        assert!(ConfigValidator::new().validate(&t).is_err());
    }

    #[test]
    fn test_reference_errors() {
        let t = tree(json!({
            "resources": {
                "jobs": {
                    "a": {"x": "${resources.jobs.gone.id}"},
                    "b": {"x": "${resources.jobs.a.name}"},
                    "c": {"x": "${resources.jobs.c.id}"},
                    "d": {"x": "${resources.jobs}"}
                }
            }
        }));
        let result = ConfigValidator::new().check(&t);
        assert_eq!(result.errors.len(), 4);
        assert!(result.errors[0].message.contains("undeclared"));
        assert!(result.errors[1].message.contains("only 'id'"));
        assert!(result.errors[2].message.contains("itself"));
        assert!(result.errors[3].message.contains("Malformed"));
    }

    #[test]
    fn test_unknown_group() {
        let t = tree(json!({"resources": {"pipelines": {"p": {}}}}));
        let result = ConfigValidator::new().with_known_groups(["jobs"]).check(&t);
        assert!(!result.is_valid());
        assert!(result.errors[0].message.contains("Unsupported resource kind"));
    }

    #[test]
    fn test_empty_resources_warns() {
        let result = ConfigValidator::new().check(&tree(json!({"bundle": {"name": "x"}})));
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }
}
