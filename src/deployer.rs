//! Deployment orchestration.
//!
//! [`Deployer`] ties the pieces together: it opens the deployment state,
//! plans against the desired configuration, applies the plan and always
//! finalizes the state afterwards, so work that succeeded is recorded even
//! when other resources fail.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::adapter::Adapters;
use crate::config::{ConfigTree, DeploySettings, ResourceNode};
use crate::error::{DeployError, Result, StateError};
use crate::planner::{ActionResult, ActionStatus, ActionType, DeploymentPlan, ExecutionResult, PlanExecutor, Planner};
use crate::state::{DeploymentState, StateStore};

/// Orchestrates deploy and destroy runs.
pub struct Deployer {
    adapters: Adapters,
    state: Arc<DeploymentState>,
    config: Arc<ConfigTree>,
    settings: DeploySettings,
    /// Backend overriding `settings.state_path`.
    store: Option<Arc<dyn StateStore>>,
}

/// Summary of an apply run.
#[derive(Debug, Default, Serialize)]
pub struct DeployReport {
    /// Whether every action succeeded.
    pub success: bool,
    /// Number of resources created.
    pub created: usize,
    /// Number of resources updated in place.
    pub updated: usize,
    /// Number of resources deleted and created again.
    pub recreated: usize,
    /// Number of resources deleted.
    pub deleted: usize,
    /// Number of resources left unchanged.
    pub unchanged: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of actions skipped after a dependency failed.
    pub skipped: usize,
    /// State serial after finalize.
    pub serial: u64,
    /// Errors encountered.
    pub errors: Vec<String>,
    /// Per-resource results.
    pub results: Vec<ActionResult>,
    /// Total apply time.
    pub duration_ms: u64,
}

impl DeployReport {
    fn from_execution(execution: ExecutionResult, serial: u64) -> Self {
        Self {
            success: execution.is_success(),
            created: execution.applied(ActionType::Create),
            updated: execution.applied(ActionType::Update) + execution.applied(ActionType::UpdateWithId),
            recreated: execution.applied(ActionType::Recreate),
            deleted: execution.applied(ActionType::Delete),
            unchanged: execution.count(ActionStatus::Unchanged),
            failed: execution.count(ActionStatus::Failed),
            skipped: execution.count(ActionStatus::Skipped),
            serial,
            errors: execution.failures().iter().map(ToString::to_string).collect(),
            duration_ms: execution.duration_ms,
            results: execution.results,
        }
    }
}

impl std::fmt::Display for DeployReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.success { "successful" } else { "failed" };
        writeln!(f, "Deployment {status}:")?;
        writeln!(f, "  Created: {}", self.created)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Recreated: {}", self.recreated)?;
        writeln!(f, "  Deleted: {}", self.deleted)?;
        writeln!(f, "  Unchanged: {}", self.unchanged)?;

        if !self.errors.is_empty() {
            writeln!(f, "  Errors:")?;
            for error in &self.errors {
                writeln!(f, "    - {error}")?;
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for Deployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployer")
            .field("adapters", &self.adapters)
            .field("state", &self.state)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Deployer {
    /// Creates a deployer for a desired configuration.
    #[must_use]
    pub fn new(adapters: Adapters, config: ConfigTree, settings: DeploySettings) -> Self {
        Self {
            adapters,
            state: Arc::new(DeploymentState::new()),
            config: Arc::new(config),
            settings,
            store: None,
        }
    }

    /// Uses a custom state backend instead of the local file.
    #[must_use]
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Desired configuration, with references resolved so far.
    #[must_use]
    pub fn config(&self) -> &ConfigTree {
        &self.config
    }

    /// Deployment state.
    #[must_use]
    pub fn state(&self) -> &DeploymentState {
        &self.state
    }

    /// Opens the deployment state if not already open.
    ///
    /// # Errors
    ///
    /// Returns an error if the state document cannot be loaded.
    pub async fn open_state(&self) -> Result<()> {
        if self.state.is_opened() {
            return Ok(());
        }
        match &self.store {
            Some(store) => self.state.open_with(Arc::clone(store)).await,
            None => self.state.open(&self.settings.state_path).await,
        }
    }

    /// Plans a deploy without applying it.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be opened, references are
    /// invalid or the dependency graph has a cycle.
    pub async fn plan(&self) -> Result<DeploymentPlan> {
        self.open_state().await?;
        Planner::new(self.adapters.clone(), Arc::clone(&self.state), Arc::clone(&self.config))
            .with_parallelism(self.settings.parallelism)
            .plan()
            .await
    }

    /// Applies a plan and finalizes the state.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::NodesFailed`] if the plan has planning
    /// failures (nothing is applied) or any action failed (everything else
    /// is applied and recorded).
    pub async fn apply(&self, plan: &DeploymentPlan) -> Result<DeployReport> {
        self.open_state().await?;
        if !plan.is_complete() {
            error!("Plan has {} failures, not applying", plan.failures.len());
            return self.finish(Err(DeployError::NodesFailed(plan.failures.clone()))).await;
        }

        let executor = PlanExecutor::new(self.adapters.clone(), Arc::clone(&self.state), Arc::clone(&self.config))
            .with_parallelism(self.settings.parallelism);
        let execution = self.finish(executor.execute(plan).await).await?;

        let failures = execution.failures();
        let report = DeployReport::from_execution(execution, self.state.serial());
        info!(
            "Deployment finished: {} created, {} updated, {} recreated, {} deleted, {} unchanged, {} failed",
            report.created, report.updated, report.recreated, report.deleted, report.unchanged, report.failed
        );
        if failures.is_empty() {
            Ok(report)
        } else {
            Err(DeployError::NodesFailed(failures))
        }
    }

    /// Plans and applies the desired configuration.
    ///
    /// The state is finalized exactly once, even if planning fails.
    ///
    /// # Errors
    ///
    /// Returns an error if planning fails or any action fails.
    pub async fn deploy(&self) -> Result<DeployReport> {
        self.open_state().await?;
        let plan = match self.plan().await {
            Ok(plan) => plan,
            Err(e) => return self.finish(Err(e)).await,
        };
        if plan.is_empty() && plan.is_complete() {
            info!("No changes required - state is converged");
        }
        self.apply(&plan).await
    }

    /// Deletes every recorded resource, dependents first.
    ///
    /// # Errors
    ///
    /// Returns an error if any delete fails.
    pub async fn destroy(&self) -> Result<DeployReport> {
        self.open_state().await?;
        let plan = Planner::new(self.adapters.clone(), Arc::clone(&self.state), Arc::clone(&self.config))
            .with_parallelism(self.settings.parallelism)
            .plan_destroy();
        info!("Destroying {} resources", plan.action_count());
        self.apply(&plan).await
    }

    /// Reads the remote representation of a deployed resource.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is recorded for the node, its kind is
    /// not registered, or the read fails.
    pub async fn read_remote(&self, node: &ResourceNode) -> Result<Value> {
        self.open_state().await?;
        let adapter = self.adapters.get(&node.group)?;
        let entry = self
            .state
            .get_resource_entry(node)
            .ok_or_else(|| StateError::NotFound { node: node.to_string() })?;
        if entry.id.is_empty() {
            return Err(StateError::EmptyId { node: node.to_string() }.into());
        }
        adapter.refresh(node, &entry.id).await
    }

    /// Finalizes the state, keeping the first error.
    async fn finish<T>(&self, result: Result<T>) -> Result<T> {
        match (result, self.state.finalize().await) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(finalize_err)) => {
                warn!("Failed to finalize state: {finalize_err}");
                Err(e)
            }
        }
    }
}
