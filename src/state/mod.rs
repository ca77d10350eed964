//! State management for the deployment engine.
//!
//! This module persists, per declared resource, the remote identifier and the
//! snapshot last applied, so later runs can diff against it.

mod deployment;
mod local;
mod store;
mod types;

pub use deployment::DeploymentState;
pub use local::{LocalStateStore, STATE_DIR, STATE_FILE};
pub use store::StateStore;
pub use types::{ResourceEntry, STATE_VERSION, StateDocument};
