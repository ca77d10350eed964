//! Planning: classify what apply must do for every resource.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info, warn};

use crate::adapter::Adapters;
use crate::config::{ConfigHasher, ConfigTree, DEFAULT_PARALLELISM, ID_FIELD, ResourceNode};
use crate::error::{NodeFailure, Result, StateError};
use crate::state::DeploymentState;
use crate::structdiff::Change;

use super::dependencies::{build_dependency_graph, destroy_graph};
use super::plan::{ActionType, DeploymentPlan, PlannedAction};

/// Builds deployment plans from the desired tree and recorded state.
#[derive(Debug)]
pub struct Planner {
    adapters: Adapters,
    state: Arc<DeploymentState>,
    config: Arc<ConfigTree>,
    parallelism: usize,
}

/// Shared inputs of per-node planning tasks.
struct NodePlanner {
    adapters: Adapters,
    state: Arc<DeploymentState>,
    config: Arc<ConfigTree>,
    /// Nodes other resources refer to.
    referenced: HashSet<ResourceNode>,
}

impl Planner {
    /// Creates a planner.
    #[must_use]
    pub const fn new(adapters: Adapters, state: Arc<DeploymentState>, config: Arc<ConfigTree>) -> Self {
        Self {
            adapters,
            state,
            config,
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    /// Sets the number of nodes planned concurrently.
    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Plans a deploy of the desired configuration.
    ///
    /// Nodes are planned in dependency order so that identifiers of
    /// unchanged or updated resources are substituted into the tree before
    /// their dependents are diffed. Per-node failures are collected in
    /// [`DeploymentPlan::failures`]; dependents of a failed node are left
    /// unplanned.
    ///
    /// Recorded resources no longer declared become `delete` actions when
    /// their kind is registered.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid references or a dependency cycle.
    ///
    /// # Panics
    ///
    /// Panics if the deployment state has not been opened.
    pub async fn plan(&self) -> Result<DeploymentPlan> {
        self.state.assert_opened();

        let mut plan = DeploymentPlan::new(ConfigHasher::new().hash_tree(&self.config));
        let graph = build_dependency_graph(&self.config)?;
        graph.detect_cycle()?;

        let referenced = graph
            .nodes()
            .iter()
            .filter(|node| graph.has_dependents(node))
            .cloned()
            .collect();
        let planner = Arc::new(NodePlanner {
            adapters: self.adapters.clone(),
            state: Arc::clone(&self.state),
            config: Arc::clone(&self.config),
            referenced,
        });
        let actions: Arc<Mutex<BTreeMap<ResourceNode, PlannedAction>>> = Arc::default();
        let failures: Arc<Mutex<Vec<NodeFailure>>> = Arc::default();

        let outcome = {
            let actions = Arc::clone(&actions);
            let failures = Arc::clone(&failures);
            graph
                .run(self.parallelism, move |node, failed_dep| {
                    let planner = Arc::clone(&planner);
                    let actions = Arc::clone(&actions);
                    let failures = Arc::clone(&failures);
                    async move {
                        if let Some(dep) = failed_dep {
                            warn!("Not planning {node}: dependency {dep} could not be planned");
                            return false;
                        }
                        match planner.plan_node(&node) {
                            Ok(action) => {
                                debug!("Planned {action}");
                                lock(&actions).insert(node, action);
                                true
                            }
                            Err(e) => {
                                error!("Failed to plan {node}: {e}");
                                lock(&failures).push(NodeFailure {
                                    node: node.to_string(),
                                    message: e.to_string(),
                                });
                                false
                            }
                        }
                    }
                })
                .await?
        };

        plan.actions = std::mem::take(&mut *lock(&actions));
        plan.failures = std::mem::take(&mut *lock(&failures));
        plan.failures.sort_by(|a, b| a.node.cmp(&b.node));
        plan.graph = graph;
        self.plan_removed(&mut plan);

        info!(
            "Planned {} resources: {} to change, {} failed",
            outcome.succeeded.len() + outcome.failed.len(),
            plan.action_count(),
            plan.failures.len()
        );
        Ok(plan)
    }

    /// Adds `delete` actions for recorded resources absent from the tree.
    fn plan_removed(&self, plan: &mut DeploymentPlan) {
        for (node, entry) in self.state.entries() {
            if self.config.contains(&node) {
                continue;
            }
            if !self.adapters.contains(&node.group) {
                warn!("Leaving {node} in place: resource kind '{}' is not registered", node.group);
                continue;
            }
            if entry.id.is_empty() {
                plan.failures.push(NodeFailure {
                    node: node.to_string(),
                    message: StateError::EmptyId { node: node.to_string() }.to_string(),
                });
                continue;
            }
            plan.graph.add_node(node.clone());
            let action = PlannedAction::new(node.clone(), ActionType::Delete, "removed from configuration")
                .with_id(entry.id);
            plan.actions.insert(node, action);
        }
    }

    /// Plans deletion of every recorded resource.
    ///
    /// Resources are ordered so that dependents are deleted first, as far
    /// as the current configuration still describes their references.
    ///
    /// # Panics
    ///
    /// Panics if the deployment state has not been opened.
    #[must_use]
    pub fn plan_destroy(&self) -> DeploymentPlan {
        self.state.assert_opened();

        let mut plan = DeploymentPlan::new(ConfigHasher::new().hash_tree(&self.config));
        let mut deletable = Vec::new();

        for (node, entry) in self.state.entries() {
            if !self.adapters.contains(&node.group) {
                warn!("Leaving {node} in place: resource kind '{}' is not registered", node.group);
                continue;
            }
            if entry.id.is_empty() {
                plan.failures.push(NodeFailure {
                    node: node.to_string(),
                    message: StateError::EmptyId { node: node.to_string() }.to_string(),
                });
                continue;
            }
            let action = PlannedAction::new(node.clone(), ActionType::Delete, "destroy").with_id(entry.id);
            plan.actions.insert(node.clone(), action);
            deletable.push(node);
        }

        plan.graph = destroy_graph(&self.config, &deletable);
        info!("Planned destroy of {} resources", deletable.len());
        plan
    }
}

impl NodePlanner {
    fn plan_node(&self, node: &ResourceNode) -> Result<PlannedAction> {
        let adapter = self.adapters.get(&node.group)?;
        let desired = adapter.prepare_state(node, self.config.resource_config(node)?)?;

        let Some(entry) = self.state.get_resource_entry(node) else {
            if self.referenced.contains(node) {
                debug!("References to {node} resolve once it is created");
            }
            return Ok(PlannedAction::new(node.clone(), ActionType::Create, "new resource"));
        };
        if entry.id.is_empty() {
            return Err(StateError::EmptyId { node: node.to_string() }.into());
        }

        let changes = adapter.compute_changes(node, &entry.state, &desired)?;
        let action_type = adapter.classify_by_triggers(&changes);

        if self.referenced.contains(node) {
            if action_type.keeps_id() {
                let replaced = self.config.replace_reference(&node.reference(ID_FIELD), &entry.id);
                debug!("Resolved {replaced} references to {node} (ID: {})", entry.id);
            } else {
                debug!("References to {node} resolve after {action_type}");
            }
        }

        let reason = describe_changes(&changes);
        Ok(PlannedAction::new(node.clone(), action_type, reason)
            .with_id(entry.id)
            .with_changes(changes))
    }
}

fn describe_changes(changes: &[Change]) -> String {
    match changes {
        [] => String::from("unchanged"),
        [single] => format!("{} changed", single.path),
        many => format!("{} and {} more changed", many[0].path, many.len() - 1),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
