//! Configuration module for the bundle deployment engine.
//!
//! This module handles the desired-state side of a deployment:
//! - Loading the rendered configuration tree from YAML or JSON
//! - Resource addressing and `${resources...}` reference expressions
//! - Validation of configuration values
//! - Computing configuration hashes for change detection
//! - Engine settings read from the environment

mod hash;
mod node;
mod parser;
mod refs;
mod settings;
mod tree;
mod validator;

pub use hash::ConfigHasher;
pub use node::ResourceNode;
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use refs::{ID_FIELD, Reference, collect_references, find_references, unresolved_references};
pub use settings::{DEFAULT_PARALLELISM, DeploySettings, PARALLELISM_ENV, STATE_PATH_ENV};
pub use tree::ConfigTree;
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
