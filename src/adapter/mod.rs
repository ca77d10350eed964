//! Resource adapters.
//!
//! Each resource kind implements [`Resource`] with its own typed config,
//! state and remote representation. [`AdapterRegistry`] validates a kind's
//! triggers and capabilities when it is registered and produces one shared
//! [`Adapter`] per kind, which the planner and executor drive through JSON
//! values.

mod registry;
mod resource;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ResourceNode;
use crate::error::{ConfigError, DeployError, Result, StateError};
use crate::planner::ActionType;
use crate::structdiff::{self, Change};

pub use registry::{AdapterRegistry, Adapters};
pub use resource::{Capabilities, Created, Resource};

/// Type-erased view of a [`Resource`].
#[async_trait]
trait ErasedResource: Send + Sync {
    fn prepare_state(&self, node: &ResourceNode, config: Value) -> Result<Value>;
    fn compute_changes(&self, node: &ResourceNode, old: &Value, new: &Value) -> Result<Vec<Change>>;
    async fn refresh(&self, node: &ResourceNode, id: &str) -> Result<Value>;
    async fn create(&self, node: &ResourceNode, state: &Value) -> Result<Created<Value>>;
    async fn update(&self, node: &ResourceNode, id: &str, state: &Value) -> Result<Option<Value>>;
    async fn update_with_id(&self, node: &ResourceNode, id: &str, state: &Value) -> Result<Created<Value>>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn wait_after_create(&self, node: &ResourceNode, id: &str, state: &Value) -> Result<Option<Value>>;
    async fn wait_after_update(&self, node: &ResourceNode, id: &str, state: &Value) -> Result<Option<Value>>;
}

/// Binds a concrete kind to [`ErasedResource`].
struct Typed<K> {
    inner: K,
}

impl<K: Resource> Typed<K> {
    fn decode_state(node: &ResourceNode, state: &Value) -> Result<K::State> {
        serde_json::from_value(state.clone()).map_err(|e| {
            StateError::InvalidEntry {
                node: node.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| StateError::serialization(e.to_string()).into())
}

fn encode_created<R: Serialize>(created: Created<R>) -> Result<Created<Value>> {
    Ok(Created {
        id: created.id,
        remote: created.remote.as_ref().map(encode).transpose()?,
    })
}

#[async_trait]
impl<K: Resource> ErasedResource for Typed<K> {
    fn prepare_state(&self, node: &ResourceNode, config: Value) -> Result<Value> {
        let config: K::Config = serde_json::from_value(config).map_err(|e| ConfigError::InvalidResourceConfig {
            node: node.to_string(),
            message: e.to_string(),
        })?;
        encode(&self.inner.prepare_state(config)?)
    }

    fn compute_changes(&self, node: &ResourceNode, old: &Value, new: &Value) -> Result<Vec<Change>> {
        let old = Self::decode_state(node, old)?;
        let new = Self::decode_state(node, new)?;
        Ok(structdiff::diff(&old, &new)?)
    }

    async fn refresh(&self, _node: &ResourceNode, id: &str) -> Result<Value> {
        encode(&self.inner.refresh(id).await?)
    }

    async fn create(&self, node: &ResourceNode, state: &Value) -> Result<Created<Value>> {
        let state = Self::decode_state(node, state)?;
        encode_created(self.inner.create(&state).await?)
    }

    async fn update(&self, node: &ResourceNode, id: &str, state: &Value) -> Result<Option<Value>> {
        let state = Self::decode_state(node, state)?;
        self.inner.update(id, &state).await?.as_ref().map(encode).transpose()
    }

    async fn update_with_id(&self, node: &ResourceNode, id: &str, state: &Value) -> Result<Created<Value>> {
        let state = Self::decode_state(node, state)?;
        encode_created(self.inner.update_with_id(id, &state).await?)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id).await
    }

    async fn wait_after_create(&self, node: &ResourceNode, id: &str, state: &Value) -> Result<Option<Value>> {
        let state = Self::decode_state(node, state)?;
        self.inner.wait_after_create(id, &state).await?.as_ref().map(encode).transpose()
    }

    async fn wait_after_update(&self, node: &ResourceNode, id: &str, state: &Value) -> Result<Option<Value>> {
        let state = Self::decode_state(node, state)?;
        self.inner.wait_after_update(id, &state).await?.as_ref().map(encode).transpose()
    }
}

/// Validated facade over one resource kind.
pub struct Adapter {
    group: String,
    capabilities: Capabilities,
    triggers: Vec<(String, ActionType)>,
    inner: Box<dyn ErasedResource>,
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("group", &self.group)
            .field("capabilities", &self.capabilities)
            .field("triggers", &self.triggers)
            .finish_non_exhaustive()
    }
}

impl Adapter {
    fn new<K: Resource>(group: &str, kind: K) -> Self {
        Self {
            group: group.to_string(),
            capabilities: K::CAPABILITIES,
            triggers: K::field_triggers()
                .iter()
                .map(|(path, action)| ((*path).to_string(), *action))
                .collect(),
            inner: Box::new(Typed { inner: kind }),
        }
    }

    /// Resource group served by this adapter.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Optional operations of the kind.
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Decodes a resource's configuration and returns its desired snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidResourceConfig`] if the configuration
    /// does not decode into the kind's config type.
    pub fn prepare_state(&self, node: &ResourceNode, config: Value) -> Result<Value> {
        self.inner.prepare_state(node, config)
    }

    /// Diffs a persisted snapshot against a desired one.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidEntry`] if either snapshot does not
    /// decode into the kind's state type.
    pub fn compute_changes(&self, node: &ResourceNode, old: &Value, new: &Value) -> Result<Vec<Change>> {
        self.inner.compute_changes(node, old, new)
    }

    /// Returns the action forced by a changed path, `update` by default.
    ///
    /// The longest trigger naming the path or one of its ancestors wins.
    #[must_use]
    pub fn trigger_for(&self, path: &structdiff::Path) -> ActionType {
        self.triggers
            .iter()
            .filter(|(prefix, _)| path.matches_prefix(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(ActionType::Update, |(_, action)| *action)
    }

    /// Classifies a set of changes by the highest-precedence trigger.
    #[must_use]
    pub fn classify_by_triggers(&self, changes: &[Change]) -> ActionType {
        changes
            .iter()
            .map(|change| self.trigger_for(&change.path))
            .max()
            .unwrap_or(ActionType::Noop)
    }

    /// Reads a resource's remote representation.
    ///
    /// # Errors
    ///
    /// Returns the kind's error if the read fails.
    pub async fn refresh(&self, node: &ResourceNode, id: &str) -> Result<Value> {
        self.inner.refresh(node, id).await
    }

    /// Creates a resource from a desired snapshot.
    ///
    /// # Errors
    ///
    /// Returns the kind's error, or [`StateError::EmptyId`] if the kind
    /// returned an empty identifier.
    pub async fn create(&self, node: &ResourceNode, state: &Value) -> Result<Created<Value>> {
        let created = self.inner.create(node, state).await?;
        if created.id.is_empty() {
            return Err(StateError::EmptyId { node: node.to_string() }.into());
        }
        Ok(created)
    }

    /// Updates a resource in place.
    ///
    /// # Errors
    ///
    /// Returns the kind's error if the update fails.
    pub async fn update(&self, node: &ResourceNode, id: &str, state: &Value) -> Result<Option<Value>> {
        self.inner.update(node, id, state).await
    }

    /// Updates a resource that may come back under a new identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Internal`] if the kind does not support it.
    pub async fn update_with_id(&self, node: &ResourceNode, id: &str, state: &Value) -> Result<Created<Value>> {
        if !self.capabilities.update_with_id {
            return Err(DeployError::internal(format!(
                "{node}: resource kind '{}' does not support update_with_id",
                self.group
            )));
        }
        let updated = self.inner.update_with_id(node, id, state).await?;
        if updated.id.is_empty() {
            return Err(StateError::EmptyId { node: node.to_string() }.into());
        }
        Ok(updated)
    }

    /// Deletes a resource.
    ///
    /// # Errors
    ///
    /// Returns the kind's error if the delete fails.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id).await
    }

    /// Waits for a created resource, if the kind supports waiting.
    ///
    /// # Errors
    ///
    /// Returns the kind's error if waiting fails.
    pub async fn wait_after_create(&self, node: &ResourceNode, id: &str, state: &Value) -> Result<Option<Value>> {
        if !self.capabilities.wait_after_create {
            return Ok(None);
        }
        debug!("Waiting for {node} after create (ID: {id})");
        self.inner.wait_after_create(node, id, state).await
    }

    /// Waits for an updated resource, if the kind supports waiting.
    ///
    /// # Errors
    ///
    /// Returns the kind's error if waiting fails.
    pub async fn wait_after_update(&self, node: &ResourceNode, id: &str, state: &Value) -> Result<Option<Value>> {
        if !self.capabilities.wait_after_update {
            return Ok(None);
        }
        debug!("Waiting for {node} after update (ID: {id})");
        self.inner.wait_after_update(node, id, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Deserialize)]
    struct VolumeConfig {
        name: String,
        #[serde(default)]
        catalog: String,
        #[serde(default)]
        comment: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct VolumeState {
        name: String,
        catalog: String,
        comment: String,
    }

    #[derive(Default)]
    struct Volumes {
        waited: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Resource for Volumes {
        type Config = VolumeConfig;
        type State = VolumeState;
        type Remote = VolumeState;

        const CAPABILITIES: Capabilities = Capabilities {
            wait_after_create: true,
            ..Capabilities::NONE
        };

        fn field_triggers() -> &'static [(&'static str, ActionType)] {
            &[("catalog", ActionType::Recreate)]
        }

        fn prepare_state(&self, config: VolumeConfig) -> Result<VolumeState> {
            Ok(VolumeState {
                name: config.name,
                catalog: config.catalog,
                comment: config.comment,
            })
        }

        async fn refresh(&self, id: &str) -> Result<VolumeState> {
            Ok(VolumeState {
                name: id.to_string(),
                catalog: String::from("main"),
                comment: String::new(),
            })
        }

        async fn create(&self, state: &VolumeState) -> Result<Created<VolumeState>> {
            Ok(Created::with_remote(format!("{}.{}", state.catalog, state.name), state.clone()))
        }

        async fn update(&self, _id: &str, _state: &VolumeState) -> Result<Option<VolumeState>> {
            Ok(None)
        }

        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }

        async fn wait_after_create(&self, id: &str, _state: &VolumeState) -> Result<Option<VolumeState>> {
            self.waited.lock().expect("lock").push(id.to_string());
            Ok(None)
        }
    }

    fn node() -> ResourceNode {
        ResourceNode::new("volumes", "files")
    }

    #[test]
    fn test_prepare_state_rejects_bad_config() {
        let adapter = Adapter::new("volumes", Volumes::default());
        let err = adapter
            .prepare_state(&node(), json!({"catalog": "main"}))
            .expect_err("name is required");
        assert!(matches!(err, DeployError::Config(ConfigError::InvalidResourceConfig { .. })));

        let state = adapter
            .prepare_state(&node(), json!({"name": "files", "catalog": "main"}))
            .expect("valid");
        assert_eq!(state, json!({"name": "files", "catalog": "main", "comment": ""}));
    }

    #[test]
    fn test_classify() {
        let adapter = Adapter::new("volumes", Volumes::default());
        let old = json!({"name": "files", "catalog": "main", "comment": ""});

        assert_eq!(adapter.classify_by_triggers(&[]), ActionType::Noop);

        let changes = adapter
            .compute_changes(&node(), &old, &json!({"name": "files", "catalog": "main", "comment": "x"}))
            .expect("diff");
        assert_eq!(changes.len(), 1);
        assert_eq!(adapter.classify_by_triggers(&changes), ActionType::Update);

        let changes = adapter
            .compute_changes(&node(), &old, &json!({"name": "files", "catalog": "dev", "comment": "x"}))
            .expect("diff");
        assert_eq!(changes.len(), 2);
        assert_eq!(adapter.classify_by_triggers(&changes), ActionType::Recreate);
    }

    #[test]
    fn test_invalid_persisted_state() {
        let adapter = Adapter::new("volumes", Volumes::default());
        let err = adapter
            .compute_changes(&node(), &json!({"unexpected": true}), &json!({"name": "a", "catalog": "", "comment": ""}))
            .expect_err("invalid entry");
        assert!(matches!(err, DeployError::State(StateError::InvalidEntry { .. })));
    }

    #[tokio::test]
    async fn test_optional_operations() {
        let adapter = Adapter::new("volumes", Volumes::default());
        let state = json!({"name": "files", "catalog": "main", "comment": ""});

        let created = adapter.create(&node(), &state).await.expect("create");
        assert_eq!(created.id, "main.files");
        assert_eq!(created.remote, Some(state.clone()));

        adapter
            .wait_after_create(&node(), &created.id, &state)
            .await
            .expect("wait");
        assert_eq!(adapter.wait_after_update(&node(), "x", &state).await.expect("noop"), None);

        let err = adapter
            .update_with_id(&node(), &created.id, &state)
            .await
            .expect_err("not supported");
        assert!(matches!(err, DeployError::Internal(_)));
    }
}
