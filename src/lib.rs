// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // Public items should be documented
#![warn(dead_code)]                   // Unused code is flagged
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are flagged
#![warn(unused_variables)]            // Unused variables are flagged
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Bundle Deploy
//!
//! A deployment engine for bundles of declared resources.
//!
//! ## Overview
//!
//! A bundle declares resources under `resources.<group>.<key>`. Resources
//! may refer to each other's remote identifiers with
//! `${resources.<group>.<key>.id}`. The engine:
//!
//! - orders resources by those references and rejects cycles
//! - diffs the recorded state of each resource against its desired state
//! - classifies a create, update, recreate or delete per resource
//! - applies the plan with bounded parallelism, dependencies first
//! - records every successful change in a local state document
//!
//! ## Architecture
//!
//! 1. **Desired state**: a [`config::ConfigTree`] loaded from YAML or JSON
//! 2. **Recorded state**: a [`state::DeploymentState`] backed by a
//!    [`state::StateStore`]
//! 3. **Adapters**: one [`adapter::Resource`] implementation per group,
//!    registered in an [`adapter::AdapterRegistry`]
//! 4. **Planner and executor**: [`planner::Planner`] and
//!    [`planner::PlanExecutor`], driven by [`deployer::Deployer`]
//!
//! ## Modules
//!
//! - [`graph`]: Dependency graph scheduler
//! - [`structdiff`]: Structural diff of serializable values
//! - [`state`]: State document and storage backends
//! - [`config`]: Configuration tree, parsing, validation and settings
//! - [`adapter`]: Resource kinds and their capabilities
//! - [`planner`]: Planning and plan execution
//! - [`deployer`]: Deploy and destroy orchestration
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! resources:
//!   schemas:
//!     analytics:
//!       name: analytics
//!   jobs:
//!     nightly:
//!       name: nightly
//!       target_schema: ${resources.schemas.analytics.id}
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod adapter;
pub mod cli;
pub mod config;
pub mod deployer;
pub mod error;
pub mod graph;
pub mod planner;
pub mod state;
pub mod structdiff;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use adapter::{Adapter, AdapterRegistry, Adapters, Capabilities, Created, Resource};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigTree, ConfigValidator, DeploySettings, ResourceNode};
pub use deployer::{DeployReport, Deployer};
pub use error::{DeployError, Result};
pub use graph::Graph;
pub use planner::{ActionType, DeploymentPlan, PlanExecutor, PlannedAction, Planner};
pub use state::{DeploymentState, LocalStateStore, ResourceEntry, StateDocument, StateStore};
pub use structdiff::{Change, diff};
