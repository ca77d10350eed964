//! Plan executor for applying deployment plans.
//!
//! The plan graph is run with a bounded worker pool. Each node dispatches
//! its planned action to the resource's adapter, records the outcome in
//! the deployment state and publishes its identifier to dependents by
//! substituting it into the shared configuration tree.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::adapter::{Adapter, Adapters};
use crate::config::{ConfigTree, DEFAULT_PARALLELISM, ID_FIELD, ResourceNode, unresolved_references};
use crate::error::{DeployError, NodeFailure, Result, StateError};
use crate::state::DeploymentState;

use super::plan::{ActionType, DeploymentPlan, PlannedAction};

/// Executor for deployment plans.
#[derive(Debug)]
pub struct PlanExecutor {
    adapters: Adapters,
    state: Arc<DeploymentState>,
    config: Arc<ConfigTree>,
    parallelism: usize,
}

/// How a single node ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// The action was carried out.
    Applied,
    /// Nothing had to be done.
    Unchanged,
    /// Not attempted because a dependency failed.
    Skipped,
    /// The action failed.
    Failed,
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Applied => "applied",
            Self::Unchanged => "unchanged",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Result of executing a single action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    /// Resource the action applied to.
    pub node: ResourceNode,
    /// Action that was planned.
    pub action_type: ActionType,
    /// Outcome.
    pub status: ActionStatus,
    /// Remote identifier after the action, if known.
    pub id: Option<String>,
    /// Error or skip reason.
    pub error: Option<String>,
    /// Wall time spent on the node.
    pub duration_ms: u64,
}

impl ActionResult {
    fn new(node: ResourceNode, action_type: ActionType, status: ActionStatus) -> Self {
        Self {
            node,
            action_type,
            status,
            id: None,
            error: None,
            duration_ms: 0,
        }
    }

    /// Returns true unless the action failed or was skipped.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, ActionStatus::Applied | ActionStatus::Unchanged)
    }
}

/// Result of executing the entire plan.
#[derive(Debug, Default, Serialize)]
pub struct ExecutionResult {
    /// Individual action results, sorted by node.
    pub results: Vec<ActionResult>,
    /// Total wall time.
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Returns the number of results with a status.
    #[must_use]
    pub fn count(&self, status: ActionStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Returns the number of applied actions of a type.
    #[must_use]
    pub fn applied(&self, action_type: ActionType) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == ActionStatus::Applied && r.action_type == action_type)
            .count()
    }

    /// Returns the result for a node.
    #[must_use]
    pub fn result(&self, node: &ResourceNode) -> Option<&ActionResult> {
        self.results.iter().find(|r| &r.node == node)
    }

    /// Returns true if no action failed or was skipped.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.results.iter().all(ActionResult::is_success)
    }

    /// Failed and skipped nodes with their reasons.
    #[must_use]
    pub fn failures(&self) -> Vec<NodeFailure> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| NodeFailure {
                node: r.node.to_string(),
                message: r.error.clone().unwrap_or_else(|| r.status.to_string()),
            })
            .collect()
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} actions: {} applied, {} unchanged, {} failed, {} skipped",
            self.results.len(),
            self.count(ActionStatus::Applied),
            self.count(ActionStatus::Unchanged),
            self.count(ActionStatus::Failed),
            self.count(ActionStatus::Skipped)
        )
    }
}

/// Shared inputs of per-node apply tasks.
struct NodeExecutor {
    adapters: Adapters,
    state: Arc<DeploymentState>,
    config: Arc<ConfigTree>,
    actions: BTreeMap<ResourceNode, PlannedAction>,
    /// Nodes other resources refer to.
    referenced: HashSet<ResourceNode>,
}

impl PlanExecutor {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(adapters: Adapters, state: Arc<DeploymentState>, config: Arc<ConfigTree>) -> Self {
        Self {
            adapters,
            state,
            config,
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    /// Sets the number of nodes applied concurrently.
    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Executes a deployment plan.
    ///
    /// Every node is visited once. A failure stops only the failing node
    /// and its dependents; independent branches run to completion and
    /// their state is recorded.
    ///
    /// # Errors
    ///
    /// Returns an error only if the plan graph is cyclic, before anything
    /// runs. Node failures are reported in the returned result.
    pub async fn execute(&self, plan: &DeploymentPlan) -> Result<ExecutionResult> {
        self.state.assert_opened();
        info!("Executing deployment plan with {} actions", plan.action_count());
        let started = Instant::now();

        let executor = Arc::new(NodeExecutor {
            adapters: self.adapters.clone(),
            state: Arc::clone(&self.state),
            config: Arc::clone(&self.config),
            actions: plan.actions.clone(),
            referenced: plan
                .graph
                .nodes()
                .iter()
                .filter(|node| plan.graph.has_dependents(node))
                .cloned()
                .collect(),
        });
        let results: Arc<Mutex<Vec<ActionResult>>> = Arc::default();

        let outcome = {
            let results = Arc::clone(&results);
            plan.graph
                .run(self.parallelism, move |node, failed_dep| {
                    let executor = Arc::clone(&executor);
                    let results = Arc::clone(&results);
                    async move {
                        let result = executor.execute_node(node, failed_dep).await;
                        let ok = result.is_success();
                        results.lock().unwrap_or_else(PoisonError::into_inner).push(result);
                        ok
                    }
                })
                .await?
        };

        let mut results = std::mem::take(&mut *results.lock().unwrap_or_else(PoisonError::into_inner));
        for node in outcome.failed {
            if !results.iter().any(|r| r.node == node) {
                let mut result = ActionResult::new(node.clone(), plan.action_type(&node), ActionStatus::Failed);
                result.error = Some(String::from("action did not complete"));
                results.push(result);
            }
        }
        results.sort_by(|a, b| a.node.cmp(&b.node));

        let execution = ExecutionResult {
            results,
            duration_ms: elapsed_ms(started),
        };
        if execution.is_success() {
            info!("{execution}");
        } else {
            warn!("{execution}");
        }
        Ok(execution)
    }
}

impl NodeExecutor {
    async fn execute_node(&self, node: ResourceNode, failed_dep: Option<ResourceNode>) -> ActionResult {
        let Some(action) = self.actions.get(&node) else {
            return ActionResult::new(node, ActionType::Unset, ActionStatus::Unchanged);
        };
        let action_type = action.action_type;

        if let Some(dep) = failed_dep {
            warn!("Skipping {node}: dependency {dep} failed");
            let mut result = ActionResult::new(node, action_type, ActionStatus::Skipped);
            result.error = Some(format!("skipped because {dep} failed"));
            return result;
        }
        if action_type.is_skipped() {
            let mut result = ActionResult::new(node, action_type, ActionStatus::Unchanged);
            result.id.clone_from(&action.id);
            return result;
        }

        info!("Executing: {}", action.description());
        let started = Instant::now();
        let mut result = match self.apply(action).await {
            Ok(id) => {
                let mut result = ActionResult::new(node, action_type, ActionStatus::Applied);
                result.id = Some(id);
                result
            }
            Err(e) => {
                error!("Failed to {action_type} {node}: {e}");
                let mut result = ActionResult::new(node, action_type, ActionStatus::Failed);
                result.error = Some(e.to_string());
                result
            }
        };
        result.duration_ms = elapsed_ms(started);
        result
    }

    /// Carries out one action and returns the resulting identifier.
    async fn apply(&self, action: &PlannedAction) -> Result<String> {
        let node = &action.node;
        let adapter = self.adapters.get(&node.group)?;

        if action.action_type == ActionType::Delete {
            let id = self.recorded_id(action)?;
            adapter.delete(&id).await?;
            self.state.delete_state(node);
            info!("Deleted {node} (ID: {id})");
            return Ok(id);
        }

        let config = self.config.resource_config(node)?;
        let unresolved = unresolved_references(&config);
        if !unresolved.is_empty() {
            return Err(DeployError::internal(format!(
                "{node} still refers to unresolved {}",
                unresolved.join(", ")
            )));
        }
        let state = adapter.prepare_state(node, config)?;

        let id = match action.action_type {
            ActionType::Create => self.create(&adapter, node, state).await?,
            ActionType::Recreate => {
                let old_id = self.recorded_id(action)?;
                adapter.delete(&old_id).await?;
                self.state.delete_state(node);
                info!("Deleted {node} for recreate (ID: {old_id})");
                self.create(&adapter, node, state).await?
            }
            ActionType::Update => {
                let id = self.recorded_id(action)?;
                let remote = adapter.update(node, &id, &state).await?;
                log_remote(node, "update", remote.as_ref());
                self.state.save_state(node, &id, state.clone())?;
                info!("Updated {node} (ID: {id})");
                let remote = adapter.wait_after_update(node, &id, &state).await?;
                log_remote(node, "wait", remote.as_ref());
                id
            }
            ActionType::UpdateWithId => {
                let old_id = self.recorded_id(action)?;
                let updated = adapter.update_with_id(node, &old_id, &state).await?;
                log_remote(node, "update", updated.remote.as_ref());
                self.state.save_state(node, &updated.id, state.clone())?;
                if updated.id == old_id {
                    info!("Updated {node} (ID: {old_id})");
                } else {
                    info!("Updated {node} (ID: {old_id} -> {})", updated.id);
                }
                let remote = adapter.wait_after_update(node, &updated.id, &state).await?;
                log_remote(node, "wait", remote.as_ref());
                updated.id
            }
            other => {
                return Err(DeployError::internal(format!("cannot apply {other} to {node}")));
            }
        };

        if self.referenced.contains(node) {
            let replaced = self.config.replace_reference(&node.reference(ID_FIELD), &id);
            debug!("Resolved {replaced} references to {node} (ID: {id})");
        }
        Ok(id)
    }

    async fn create(&self, adapter: &Adapter, node: &ResourceNode, state: Value) -> Result<String> {
        let created = adapter.create(node, &state).await?;
        log_remote(node, "create", created.remote.as_ref());
        self.state.save_state(node, &created.id, state.clone())?;
        info!("Created {node} (ID: {})", created.id);
        let remote = adapter.wait_after_create(node, &created.id, &state).await?;
        log_remote(node, "wait", remote.as_ref());
        Ok(created.id)
    }

    /// Identifier currently recorded for the node.
    fn recorded_id(&self, action: &PlannedAction) -> Result<String> {
        self.state
            .get_resource_entry(&action.node)
            .map(|entry| entry.id)
            .or_else(|| action.id.clone())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                StateError::EmptyId {
                    node: action.node.to_string(),
                }
                .into()
            })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Logs the remote representation a kind returned, if any.
fn log_remote(node: &ResourceNode, stage: &str, remote: Option<&Value>) {
    if let Some(remote) = remote {
        debug!("Remote {node} after {stage}: {remote}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::build_dependency_graph;
    use crate::state::{ResourceEntry, StateDocument, StateStore};
    use crate::testing::{Backend, MemoryStore, adapters};
    use serde_json::json;

    fn node(group: &str, key: &str) -> ResourceNode {
        ResourceNode::new(group, key)
    }

    async fn setup(config: Value, recorded: &[(ResourceNode, &str)]) -> (Arc<Backend>, PlanExecutor, DeploymentPlan) {
        let store = MemoryStore::new();
        let mut doc = StateDocument::new();
        for (node, id) in recorded {
            doc.set(
                node,
                ResourceEntry {
                    id: (*id).to_string(),
                    state: json!({"name": node.key}),
                },
            );
        }
        store.save(&doc).await.expect("seed");
        let state = Arc::new(DeploymentState::new());
        state.open_with(store).await.expect("open");

        let config = Arc::new(ConfigTree::new(config));
        let mut plan = DeploymentPlan::new("hash");
        plan.graph = build_dependency_graph(&config).expect("graph");
        let backend = Backend::new();
        let executor = PlanExecutor::new(adapters(&backend), state, config).with_parallelism(2);
        (backend, executor, plan)
    }

    #[tokio::test]
    async fn test_unresolved_reference_fails_the_node() {
        let config = json!({
            "resources": {
                "schemas": {"s": {"name": "s"}},
                "jobs": {"j": {"name": "j", "parent": "${resources.schemas.s.id}"}}
            }
        });
        let (backend, executor, mut plan) = setup(config, &[(node("schemas", "s"), "schema-1")]).await;
        plan.actions.insert(
            node("schemas", "s"),
            PlannedAction::new(node("schemas", "s"), ActionType::Noop, "unchanged").with_id("schema-1"),
        );
        plan.actions
            .insert(node("jobs", "j"), PlannedAction::new(node("jobs", "j"), ActionType::Create, "new"));

        let result = executor.execute(&plan).await.expect("acyclic");
        let job = result.result(&node("jobs", "j")).expect("result");
        assert_eq!(job.status, ActionStatus::Failed);
        assert!(job.error.as_deref().unwrap_or_default().contains("unresolved"));
        assert_eq!(result.count(ActionStatus::Unchanged), 1);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_deletes_keep_entries() {
        let config = json!({"resources": {}});
        let (backend, executor, mut plan) =
            setup(config, &[(node("jobs", "a"), "job-1"), (node("jobs", "b"), "job-2")]).await;
        // Neither object exists remotely, so the backend sees an empty name.
        backend.fail_on("");
        for (key, id) in [("a", "job-1"), ("b", "job-2")] {
            plan.graph.add_node(node("jobs", key));
            plan.actions.insert(
                node("jobs", key),
                PlannedAction::new(node("jobs", key), ActionType::Delete, "removed").with_id(id),
            );
        }

        let result = executor.execute(&plan).await.expect("acyclic");
        assert!(!result.is_success());
        assert_eq!(result.applied(ActionType::Delete), 0);
        assert_eq!(result.count(ActionStatus::Failed), 2);
        assert!(executor.state.get_resource_entry(&node("jobs", "a")).is_some());
        assert_eq!(result.failures().len(), 2);
    }

    #[test]
    fn test_execution_summary() {
        let mut result = ExecutionResult::default();
        result
            .results
            .push(ActionResult::new(node("jobs", "a"), ActionType::Create, ActionStatus::Applied));
        result
            .results
            .push(ActionResult::new(node("jobs", "b"), ActionType::Update, ActionStatus::Skipped));
        assert_eq!(result.applied(ActionType::Create), 1);
        assert_eq!(result.failures()[0].message, "skipped");
        assert_eq!(
            result.to_string(),
            "Executed 2 actions: 1 applied, 0 unchanged, 0 failed, 1 skipped"
        );
    }
}
