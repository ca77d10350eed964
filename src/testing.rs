//! In-memory resource kinds and state store for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::adapter::{AdapterRegistry, Adapters, Capabilities, Created, Resource};
use crate::error::{ApiError, Result};
use crate::planner::ActionType;
use crate::state::{StateDocument, StateStore};

/// Snapshot shared by the fake kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub catalog: String,
    #[serde(default)]
    pub comment: String,
}

/// Fake remote service recording every call.
#[derive(Debug, Default)]
pub struct Backend {
    next_id: AtomicU64,
    calls: Mutex<Vec<String>>,
    objects: Mutex<BTreeMap<String, Widget>>,
    failing: Mutex<BTreeSet<String>>,
}

impl Backend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every call for resources named `name` fail.
    pub fn fail_on(&self, name: &str) {
        self.failing.lock().expect("lock").insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("lock").clear();
    }

    /// Index of the first call starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(prefix))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.objects.lock().expect("lock").contains_key(id)
    }

    fn record(&self, call: String, name: &str) -> Result<()> {
        self.calls.lock().expect("lock").push(call.clone());
        if self.failing.lock().expect("lock").contains(name) {
            return Err(ApiError::request("POST", call, 500, "injected failure").into());
        }
        Ok(())
    }

    fn create(&self, kind: &str, state: &Widget) -> Result<String> {
        self.record(format!("create {kind} {}", state.name), &state.name)?;
        let id = format!("{kind}-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.objects.lock().expect("lock").insert(id.clone(), state.clone());
        Ok(id)
    }

    fn update(&self, kind: &str, id: &str, state: &Widget) -> Result<()> {
        self.record(format!("update {kind} {id}"), &state.name)?;
        self.objects.lock().expect("lock").insert(id.to_string(), state.clone());
        Ok(())
    }

    fn delete(&self, kind: &str, id: &str) -> Result<()> {
        let name = self
            .objects
            .lock()
            .expect("lock")
            .get(id)
            .map(|w| w.name.clone())
            .unwrap_or_default();
        self.record(format!("delete {kind} {id}"), &name)?;
        self.objects.lock().expect("lock").remove(id);
        Ok(())
    }

    fn read(&self, id: &str) -> Result<Widget> {
        self.objects
            .lock()
            .expect("lock")
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::request("GET", id, 404, "not found").into())
    }
}

/// Jobs: a changed catalog forces delete and create.
pub struct Jobs {
    pub backend: Arc<Backend>,
}

#[async_trait]
impl Resource for Jobs {
    type Config = Widget;
    type State = Widget;
    type Remote = Widget;

    fn field_triggers() -> &'static [(&'static str, ActionType)] {
        &[("catalog", ActionType::Recreate)]
    }

    fn prepare_state(&self, config: Widget) -> Result<Widget> {
        Ok(config)
    }

    async fn refresh(&self, id: &str) -> Result<Widget> {
        self.backend.read(id)
    }

    async fn create(&self, state: &Widget) -> Result<Created<Widget>> {
        Ok(Created::id(self.backend.create("jobs", state)?))
    }

    async fn update(&self, id: &str, state: &Widget) -> Result<Option<Widget>> {
        self.backend.update("jobs", id, state)?;
        Ok(None)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.backend.delete("jobs", id)
    }
}

/// Schemas: renaming changes the identifier in place.
pub struct Schemas {
    pub backend: Arc<Backend>,
}

#[async_trait]
impl Resource for Schemas {
    type Config = Widget;
    type State = Widget;
    type Remote = Widget;

    const CAPABILITIES: Capabilities = Capabilities {
        update_with_id: true,
        wait_after_create: true,
        wait_after_update: false,
    };

    fn field_triggers() -> &'static [(&'static str, ActionType)] {
        &[("name", ActionType::UpdateWithId)]
    }

    fn prepare_state(&self, config: Widget) -> Result<Widget> {
        Ok(config)
    }

    async fn refresh(&self, id: &str) -> Result<Widget> {
        self.backend.read(id)
    }

    async fn create(&self, state: &Widget) -> Result<Created<Widget>> {
        let id = self.backend.create("schemas", state)?;
        Ok(Created::with_remote(id, state.clone()))
    }

    async fn update(&self, id: &str, state: &Widget) -> Result<Option<Widget>> {
        self.backend.update("schemas", id, state)?;
        Ok(Some(state.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.backend.delete("schemas", id)
    }

    async fn update_with_id(&self, id: &str, state: &Widget) -> Result<Created<Widget>> {
        self.backend.delete("schemas", id)?;
        let new_id = self.backend.create("schemas", state)?;
        Ok(Created::id(new_id))
    }

    async fn wait_after_create(&self, id: &str, _state: &Widget) -> Result<Option<Widget>> {
        self.backend.record(format!("wait schemas {id}"), "")?;
        Ok(None)
    }
}

/// Adapters for `jobs` and `schemas` sharing one backend.
pub fn adapters(backend: &Arc<Backend>) -> Adapters {
    let mut registry = AdapterRegistry::new();
    let jobs = Arc::clone(backend);
    registry
        .register("jobs", move || Jobs {
            backend: Arc::clone(&jobs),
        })
        .expect("register jobs");
    let schemas = Arc::clone(backend);
    registry
        .register("schemas", move || Schemas {
            backend: Arc::clone(&schemas),
        })
        .expect("register schemas");
    registry.instantiate()
}

/// State store keeping the document in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<Option<StateDocument>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn document(&self) -> Option<StateDocument> {
        self.document.lock().expect("lock").clone()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<Option<StateDocument>> {
        Ok(self.document())
    }

    async fn save(&self, document: &StateDocument) -> Result<()> {
        *self.document.lock().expect("lock") = Some(document.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.document.lock().expect("lock").is_some())
    }

    fn location(&self) -> String {
        String::from("memory")
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
