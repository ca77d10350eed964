//! Deployment plan types.
//!
//! A plan is the dependency graph of every resource touched by a deploy or
//! destroy, plus the action classified for each node.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ResourceNode;
use crate::error::NodeFailure;
use crate::graph::Graph;
use crate::structdiff::Change;

/// What must happen to a resource on apply.
///
/// Variants are ordered by precedence: when several changed fields force
/// different actions, the greatest one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Not classified.
    Unset,
    /// Nothing to do.
    Noop,
    /// Update in place.
    Update,
    /// Update in place, possibly receiving a new identifier.
    UpdateWithId,
    /// Delete and create again.
    Recreate,
    /// Create a new resource.
    Create,
    /// Delete a resource.
    Delete,
}

impl ActionType {
    /// Returns true if apply has nothing to do for this action.
    #[must_use]
    pub const fn is_skipped(self) -> bool {
        matches!(self, Self::Noop | Self::Unset)
    }

    /// Returns true if the remote identifier is already known and unchanged
    /// after this action.
    #[must_use]
    pub const fn keeps_id(self) -> bool {
        matches!(self, Self::Noop | Self::Update)
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unset => "unset",
            Self::Noop => "noop",
            Self::Update => "update",
            Self::UpdateWithId => "update_with_id",
            Self::Recreate => "recreate",
            Self::Create => "create",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// The action planned for one resource.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedAction {
    /// Resource the action applies to.
    pub node: ResourceNode,
    /// Action type.
    pub action_type: ActionType,
    /// Remote identifier recorded in state, if any.
    pub id: Option<String>,
    /// Field changes that led to the classification.
    pub changes: Vec<Change>,
    /// Reason for this action.
    pub reason: String,
}

impl PlannedAction {
    /// Creates an action with no recorded changes.
    #[must_use]
    pub fn new(node: ResourceNode, action_type: ActionType, reason: impl Into<String>) -> Self {
        Self {
            node,
            action_type,
            id: None,
            changes: Vec::new(),
            reason: reason.into(),
        }
    }

    /// Sets the remote identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the field changes.
    #[must_use]
    pub fn with_changes(mut self, changes: Vec<Change>) -> Self {
        self.changes = changes;
        self
    }

    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self.action_type {
            ActionType::Create => format!("Create {}", self.node),
            ActionType::Update => format!("Update {}", self.node),
            ActionType::UpdateWithId => format!("Update {} (identifier may change)", self.node),
            ActionType::Recreate => format!("Recreate {}", self.node),
            ActionType::Delete => format!("Delete {}", self.node),
            ActionType::Noop | ActionType::Unset => format!("No change for {}", self.node),
        }
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action_type, self.node)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

/// A complete deployment plan.
#[derive(Debug)]
pub struct DeploymentPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the desired configuration this plan is based on.
    pub config_hash: String,
    /// Execution order constraints.
    pub graph: Graph<ResourceNode>,
    /// Planned action per node.
    pub actions: BTreeMap<ResourceNode, PlannedAction>,
    /// Nodes that could not be planned.
    pub failures: Vec<NodeFailure>,
}

impl DeploymentPlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new(config_hash: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            config_hash: config_hash.into(),
            graph: Graph::new(),
            actions: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    /// Returns the action planned for a node.
    #[must_use]
    pub fn action(&self, node: &ResourceNode) -> Option<&PlannedAction> {
        self.actions.get(node)
    }

    /// Returns the action type planned for a node, `unset` if none.
    #[must_use]
    pub fn action_type(&self, node: &ResourceNode) -> ActionType {
        self.action(node).map_or(ActionType::Unset, |a| a.action_type)
    }

    /// Actions that change something, in node order.
    pub fn pending(&self) -> impl Iterator<Item = &PlannedAction> {
        self.actions.values().filter(|a| !a.action_type.is_skipped())
    }

    /// Returns true if the plan changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending().next().is_none()
    }

    /// Returns true if every node was planned.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the number of actions of a type.
    #[must_use]
    pub fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .values()
            .filter(|a| a.action_type == action_type)
            .count()
    }

    /// Returns the number of actions that change something.
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.pending().count()
    }
}

impl std::fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() && self.failures.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Deployment Plan ({} actions):", self.action_count())?;
        for (i, action) in self.pending().enumerate() {
            writeln!(f, "  {}. {action}", i + 1)?;
        }

        if !self.failures.is_empty() {
            writeln!(f, "\nPlanning failures:")?;
            for failure in &self.failures {
                writeln!(f, "  - {failure}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        assert!(ActionType::Noop < ActionType::Update);
        assert!(ActionType::Update < ActionType::UpdateWithId);
        assert!(ActionType::UpdateWithId < ActionType::Recreate);
        assert_eq!(
            [ActionType::Update, ActionType::Recreate, ActionType::Noop]
                .into_iter()
                .max(),
            Some(ActionType::Recreate)
        );
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(
            serde_json::to_value(ActionType::UpdateWithId).expect("serialize"),
            serde_json::json!("update_with_id")
        );
        assert_eq!(ActionType::UpdateWithId.to_string(), "update_with_id");
    }

    #[test]
    fn test_plan_counts() {
        let mut plan = DeploymentPlan::new("abc");
        assert!(plan.is_empty());
        assert_eq!(plan.to_string(), "No changes required");

        let a = ResourceNode::new("jobs", "a");
        let b = ResourceNode::new("jobs", "b");
        plan.actions
            .insert(a.clone(), PlannedAction::new(a.clone(), ActionType::Noop, "unchanged").with_id("1"));
        plan.actions
            .insert(b.clone(), PlannedAction::new(b.clone(), ActionType::Create, "new resource"));

        assert!(!plan.is_empty());
        assert_eq!(plan.action_count(), 1);
        assert_eq!(plan.count(ActionType::Noop), 1);
        assert_eq!(plan.action_type(&b), ActionType::Create);
        assert_eq!(plan.action_type(&ResourceNode::new("jobs", "c")), ActionType::Unset);
        assert!(plan.to_string().contains("1. create jobs.b (new resource)"));
    }
}
