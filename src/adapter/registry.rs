//! Registration of resource kinds.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use crate::error::{ConfigError, DeployError, Result};
use crate::planner::ActionType;

use super::Adapter;
use super::resource::Resource;

type Factory = Box<dyn Fn() -> Adapter + Send + Sync>;

/// Table of resource kinds by group name.
#[derive(Default)]
pub struct AdapterRegistry {
    factories: BTreeMap<String, Factory>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("groups", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource kind for a group.
    ///
    /// The kind's field triggers and capabilities are checked here, so an
    /// inconsistent kind never reaches planning.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Internal`] if the group is already registered,
    /// a trigger is declared twice or maps to an action other than
    /// `update`, `update_with_id` or `recreate`, or `update_with_id`
    /// triggers and the `update_with_id` capability disagree.
    pub fn register<K, F>(&mut self, group: &str, factory: F) -> Result<()>
    where
        K: Resource,
        F: Fn() -> K + Send + Sync + 'static,
    {
        if self.factories.contains_key(group) {
            return Err(DeployError::internal(format!(
                "resource kind '{group}' is already registered"
            )));
        }
        validate_kind::<K>(group)?;

        let name = group.to_string();
        self.factories
            .insert(group.to_string(), Box::new(move || Adapter::new(&name, factory())));
        debug!("Registered resource kind: {group}");
        Ok(())
    }

    /// Returns true if a group is registered.
    #[must_use]
    pub fn contains(&self, group: &str) -> bool {
        self.factories.contains_key(group)
    }

    /// Registered group names, sorted.
    #[must_use]
    pub fn groups(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Builds one adapter per registered kind.
    #[must_use]
    pub fn instantiate(&self) -> Adapters {
        Adapters {
            adapters: self
                .factories
                .iter()
                .map(|(group, factory)| (group.clone(), Arc::new(factory())))
                .collect(),
        }
    }
}

fn validate_kind<K: Resource>(group: &str) -> Result<()> {
    let mut seen = BTreeSet::new();
    let mut declares_update_with_id = false;

    for (path, action) in K::field_triggers() {
        if !seen.insert(*path) {
            return Err(DeployError::internal(format!(
                "resource kind '{group}' declares trigger '{path}' twice"
            )));
        }
        match action {
            ActionType::Update | ActionType::Recreate => {}
            ActionType::UpdateWithId => declares_update_with_id = true,
            other => {
                return Err(DeployError::internal(format!(
                    "resource kind '{group}' maps '{path}' to '{other}', expected update, update_with_id or recreate"
                )));
            }
        }
    }

    let supports_update_with_id = K::CAPABILITIES.update_with_id;
    if declares_update_with_id && !supports_update_with_id {
        return Err(DeployError::internal(format!(
            "resource kind '{group}' has an update_with_id trigger but does not implement update_with_id"
        )));
    }
    if supports_update_with_id && !declares_update_with_id {
        return Err(DeployError::internal(format!(
            "resource kind '{group}' implements update_with_id but no trigger can select it"
        )));
    }
    Ok(())
}

/// Instantiated adapters shared across concurrent node operations.
#[derive(Debug, Clone, Default)]
pub struct Adapters {
    adapters: BTreeMap<String, Arc<Adapter>>,
}

impl Adapters {
    /// Looks up the adapter for a group.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedResourceKind`] for an unknown group.
    pub fn get(&self, group: &str) -> Result<Arc<Adapter>> {
        self.adapters.get(group).cloned().ok_or_else(|| {
            ConfigError::UnsupportedResourceKind {
                group: group.to_string(),
            }
            .into()
        })
    }

    /// Returns true if a group has an adapter.
    #[must_use]
    pub fn contains(&self, group: &str) -> bool {
        self.adapters.contains_key(group)
    }

    /// Group names with an adapter, sorted.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Capabilities, Created};
    use async_trait::async_trait;
    use serde_json::Value;

    macro_rules! kind {
        ($name:ident, $caps:expr, $triggers:expr) => {
            struct $name;

            #[async_trait]
            impl Resource for $name {
                type Config = Value;
                type State = Value;
                type Remote = Value;

                const CAPABILITIES: Capabilities = $caps;

                fn field_triggers() -> &'static [(&'static str, ActionType)] {
                    $triggers
                }

                fn prepare_state(&self, config: Value) -> Result<Value> {
                    Ok(config)
                }

                async fn refresh(&self, _id: &str) -> Result<Value> {
                    Ok(Value::Null)
                }

                async fn create(&self, _state: &Value) -> Result<Created<Value>> {
                    Ok(Created::id("1"))
                }

                async fn update(&self, _id: &str, _state: &Value) -> Result<Option<Value>> {
                    Ok(None)
                }

                async fn delete(&self, _id: &str) -> Result<()> {
                    Ok(())
                }
            }
        };
    }

    const WITH_ID: Capabilities = Capabilities {
        update_with_id: true,
        ..Capabilities::NONE
    };

    kind!(Plain, Capabilities::NONE, &[("name", ActionType::Update), ("catalog", ActionType::Recreate)]);
    kind!(MissingCapability, Capabilities::NONE, &[("name", ActionType::UpdateWithId)]);
    kind!(UnusedCapability, WITH_ID, &[("name", ActionType::Recreate)]);
    kind!(WithId, WITH_ID, &[("name", ActionType::UpdateWithId)]);
    kind!(Duplicate, Capabilities::NONE, &[("name", ActionType::Update), ("name", ActionType::Recreate)]);
    kind!(BadAction, Capabilities::NONE, &[("name", ActionType::Delete)]);

    #[test]
    fn test_register_and_lookup() {
        let mut registry = AdapterRegistry::new();
        registry.register("schemas", || Plain).expect("valid kind");
        registry.register("apps", || WithId).expect("valid kind");
        assert_eq!(registry.groups(), vec!["apps", "schemas"]);

        let adapters = registry.instantiate();
        assert_eq!(adapters.get("schemas").expect("registered").group(), "schemas");
        let err = adapters.get("pipelines").expect_err("unknown");
        assert!(matches!(err, DeployError::Config(ConfigError::UnsupportedResourceKind { .. })));
    }

    #[test]
    fn test_rejects_inconsistent_kinds() {
        let mut registry = AdapterRegistry::new();
        assert!(registry.register("a", || MissingCapability).is_err());
        assert!(registry.register("b", || UnusedCapability).is_err());
        assert!(registry.register("c", || Duplicate).is_err());
        assert!(registry.register("d", || BadAction).is_err());
        assert!(registry.groups().is_empty());

        registry.register("e", || Plain).expect("valid kind");
        let err = registry.register("e", || Plain).expect_err("duplicate group");
        assert!(err.to_string().contains("already registered"));
    }
}
