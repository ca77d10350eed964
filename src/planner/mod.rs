//! Planning module for deployment operations.
//!
//! This module compares recorded state with the desired configuration,
//! classifies an action per resource and applies the resulting plan in
//! dependency order.

mod dependencies;
mod engine;
mod executor;
mod plan;

pub use dependencies::{build_dependency_graph, destroy_graph};
pub use engine::Planner;
pub use executor::{ActionResult, ActionStatus, ExecutionResult, PlanExecutor};
pub use plan::{ActionType, DeploymentPlan, PlannedAction};
