//! Error types for the bundle deployment engine.
//!
//! This module provides the error hierarchy for every stage of a deployment:
//! configuration, state persistence, remote API calls, structural diffing,
//! dependency graph validation, and per-node failures collected during a run.

use std::fmt::Write;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the deployment engine.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Remote API errors reported by resource implementations.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Structural diff errors.
    #[error("Diff error: {0}")]
    Diff(#[from] DiffError),

    /// The dependency graph contains a cycle.
    #[error("{0}")]
    Cycle(#[from] CycleError),

    /// One or more nodes failed during a graph run.
    #[error("{}", render_failures(.0))]
    NodesFailed(Vec<NodeFailure>),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Violated internal invariant.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// No adapter is registered for the resource group.
    #[error("Unsupported resource kind: {group}")]
    UnsupportedResourceKind {
        /// Resource group name (e.g. `jobs`).
        group: String,
    },

    /// A reference expression could not be parsed.
    #[error("Malformed reference '{expression}' in {node}")]
    MalformedReference {
        /// The offending expression.
        expression: String,
        /// Node containing the expression.
        node: String,
    },

    /// A reference points at a resource that is not declared.
    #[error("{node} refers to undeclared resource {target} via {expression}")]
    UndeclaredReference {
        /// Node containing the expression.
        node: String,
        /// Referenced resource.
        target: String,
        /// The offending expression.
        expression: String,
    },

    /// A reference names a field other than `id`.
    #[error("{node} refers to unsupported field '{field}' via {expression}; only 'id' can be referenced")]
    UnsupportedReferenceField {
        /// Node containing the expression.
        node: String,
        /// Requested field.
        field: String,
        /// The offending expression.
        expression: String,
    },

    /// The resource config could not be decoded into its kind's config type.
    #[error("Invalid configuration for {node}: {message}")]
    InvalidResourceConfig {
        /// Resource node.
        node: String,
        /// Decoder message.
        message: String,
    },

    /// A declared resource is missing from the configuration tree.
    #[error("Resource {node} is not present in the configuration")]
    MissingResource {
        /// Resource node.
        node: String,
    },

    /// An engine setting has an invalid value.
    #[error("Invalid setting {name}: {message}")]
    InvalidSetting {
        /// Setting name.
        name: String,
        /// Description of the problem.
        message: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// The backing document could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the failure.
        message: String,
    },

    /// A stored entry could not be decoded into its kind's state type.
    #[error("Invalid state entry for {node}: {message}")]
    InvalidEntry {
        /// Resource node.
        node: String,
        /// Decoder message.
        message: String,
    },

    /// No entry is recorded for a resource.
    #[error("No state recorded for {node}")]
    NotFound {
        /// Resource node.
        node: String,
    },

    /// A stored entry has no remote identifier.
    #[error("State entry for {node} has an empty id")]
    EmptyId {
        /// Resource node.
        node: String,
    },
}

/// Remote API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// API request failed.
    #[error("{method} {path} failed: {status} - {message}")]
    RequestFailed {
        /// HTTP method.
        method: String,
        /// Request path.
        path: String,
        /// HTTP status code.
        status: u16,
        /// Error message from API.
        message: String,
    },

    /// Network error.
    #[error("Network error: {message}")]
    Network {
        /// Description of the network error.
        message: String,
    },

    /// Timed out waiting for a resource.
    #[error("Timeout waiting for {resource}: {message}")]
    Timeout {
        /// Resource identifier.
        resource: String,
        /// What was awaited.
        message: String,
    },
}

/// Structural diff errors.
#[derive(Debug, Error)]
pub enum DiffError {
    /// The two snapshots do not share a shape.
    #[error("Cannot compare {old} with {new}")]
    TypeMismatch {
        /// Kind of the old snapshot.
        old: String,
        /// Kind of the new snapshot.
        new: String,
    },

    /// A snapshot failed to serialize.
    #[error("Failed to capture snapshot: {0}")]
    Capture(String),
}

impl serde::ser::Error for DiffError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        Self::Capture(msg.to_string())
    }
}

/// A cycle in the dependency graph.
///
/// `nodes[i]` refers to `nodes[i + 1]` (wrapping) via `labels[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct CycleError {
    /// Nodes on the cycle, in cyclic order.
    pub nodes: Vec<String>,
    /// Edge labels, one per node.
    pub labels: Vec<String>,
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("cycle detected: ")?;
        for (i, (node, label)) in self.nodes.iter().zip(&self.labels).enumerate() {
            let next = &self.nodes[(i + 1) % self.nodes.len()];
            if i == 0 {
                write!(f, "{node} refers to {next} via {label}")?;
            } else {
                write!(f, " which refers to {next} via {label}")?;
            }
        }
        f.write_str(".")
    }
}

/// A single node's failure within a graph run.
#[derive(Debug, Clone)]
pub struct NodeFailure {
    /// Node rendered as `group.key`.
    pub node: String,
    /// Failure message.
    pub message: String,
}

impl std::fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.node, self.message)
    }
}

fn render_failures(failures: &[NodeFailure]) -> String {
    match failures {
        [single] => single.to_string(),
        many => {
            let mut out = format!("{} resources failed:", many.len());
            for failure in many {
                let _ = write!(out, "\n  - {failure}");
            }
            out
        }
    }
}

/// Result type alias for deployment operations.
pub type Result<T> = std::result::Result<T, DeployError>;

impl DeployError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Api(ApiError::Network { .. } | ApiError::Timeout { .. }) => true,
            Self::Api(ApiError::RequestFailed { status, .. }) => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Api(ApiError::RequestFailed { status: 429, .. }) => Some(10),
            Self::Api(ApiError::RequestFailed { status, .. }) if *status >= 500 => Some(5),
            Self::Api(ApiError::Network { .. }) => Some(5),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a write error with the given message.
    #[must_use]
    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }
}

impl ApiError {
    /// Creates a request failure.
    #[must_use]
    pub fn request(
        method: impl Into<String>,
        path: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        Self::RequestFailed {
            method: method.into(),
            path: path.into(),
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message() {
        let err = CycleError {
            nodes: vec!["jobs.a".into(), "jobs.b".into(), "jobs.c".into()],
            labels: vec!["L1".into(), "L2".into(), "L3".into()],
        };
        assert_eq!(
            err.to_string(),
            "cycle detected: jobs.a refers to jobs.b via L1 which refers to jobs.c via L2 which refers to jobs.a via L3."
        );
    }

    #[test]
    fn test_self_cycle_message() {
        let err = CycleError {
            nodes: vec!["jobs.a".into()],
            labels: vec!["self".into()],
        };
        assert_eq!(err.to_string(), "cycle detected: jobs.a refers to jobs.a via self.");
    }

    #[test]
    fn test_retryable() {
        assert!(DeployError::from(ApiError::request("POST", "/jobs", 503, "busy")).is_retryable());
        assert!(DeployError::from(ApiError::request("POST", "/jobs", 429, "slow")).is_retryable());
        assert!(!DeployError::from(ApiError::request("POST", "/jobs", 400, "bad")).is_retryable());
        assert!(!DeployError::internal("x").is_retryable());
        assert_eq!(
            DeployError::from(ApiError::network("reset")).retry_delay_secs(),
            Some(5)
        );
    }

    #[test]
    fn test_node_failures_rendering() {
        let err = DeployError::NodesFailed(vec![
            NodeFailure { node: "jobs.a".into(), message: "boom".into() },
            NodeFailure { node: "jobs.b".into(), message: "bang".into() },
        ]);
        let text = err.to_string();
        assert!(text.starts_with("2 resources failed:"));
        assert!(text.contains("jobs.b: bang"));
    }
}
