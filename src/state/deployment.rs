//! Deployment state shared by planning and apply.
//!
//! [`DeploymentState`] wraps a [`StateStore`] with one coarse lock. It is
//! opened once per deploy or destroy, mutated node by node from concurrent
//! tasks, and finalized at the end whatever happened in between.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ResourceNode;
use crate::error::{DeployError, Result, StateError};

use super::local::LocalStateStore;
use super::store::StateStore;
use super::types::{ResourceEntry, StateDocument};

/// Lineage and serial last read from or written to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Synced {
    lineage: String,
    serial: u64,
}

/// Store-wide locked view of the state document.
#[derive(Default)]
pub struct DeploymentState {
    /// Backing store, set once by `open`.
    store: OnceLock<Arc<dyn StateStore>>,
    /// What the store held after open or the last finalize.
    synced: Mutex<Option<Synced>>,
    /// In-memory document.
    document: Mutex<Option<StateDocument>>,
}

impl fmt::Debug for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentState")
            .field("backend", &self.store.get().map(|s| s.backend_type()))
            .field("opened", &self.lock().is_some())
            .finish()
    }
}

impl DeploymentState {
    /// Creates an unopened state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the local state file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, or if the
    /// state was already opened.
    pub async fn open(&self, path: impl AsRef<Path>) -> Result<()> {
        let store = LocalStateStore::with_state_path(path.as_ref());
        self.open_with(Arc::new(store)).await
    }

    /// Opens the state from an arbitrary backend.
    ///
    /// A missing document is initialized with a fresh lineage.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or the state was already opened.
    pub async fn open_with(&self, store: Arc<dyn StateStore>) -> Result<()> {
        if self.store.get().is_some() {
            return Err(DeployError::internal("deployment state opened twice"));
        }

        let loaded = store.load().await?;
        let (document, synced) = match loaded {
            Some(document) => {
                info!(
                    "Opened state at {} (lineage {}, serial {}, {} resources)",
                    store.location(),
                    document.lineage,
                    document.serial,
                    document.len()
                );
                let synced = Synced {
                    lineage: document.lineage.clone(),
                    serial: document.serial,
                };
                (document, Some(synced))
            }
            None => {
                let document = StateDocument::new();
                info!(
                    "No state at {}, starting new lineage {}",
                    store.location(),
                    document.lineage
                );
                (document, None)
            }
        };

        if self.store.set(store).is_err() {
            return Err(DeployError::internal("deployment state opened twice"));
        }
        *self.synced.lock().unwrap_or_else(PoisonError::into_inner) = synced;
        *self.lock() = Some(document);
        Ok(())
    }

    /// Returns true once `open` has succeeded.
    #[must_use]
    pub fn is_opened(&self) -> bool {
        self.lock().is_some()
    }

    /// Panics if the state has not been opened.
    ///
    /// Using the state before `open` is a control-flow bug, not bad input.
    ///
    /// # Panics
    ///
    /// Panics when called before a successful `open`.
    pub fn assert_opened(&self) {
        if !self.is_opened() {
            not_opened();
        }
    }

    /// Returns a copy of the entry for a node.
    #[must_use]
    pub fn get_resource_entry(&self, node: &ResourceNode) -> Option<ResourceEntry> {
        self.with_document(|doc| doc.get(node).cloned())
    }

    /// Records the remote id and applied snapshot for a node.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::EmptyId`] if `id` is empty.
    pub fn save_state(&self, node: &ResourceNode, id: &str, state: Value) -> Result<()> {
        if id.is_empty() {
            return Err(StateError::EmptyId { node: node.to_string() }.into());
        }
        self.with_document(|doc| {
            doc.set(node, ResourceEntry { id: id.to_string(), state });
        });
        debug!("Recorded state for {node} (ID: {id})");
        Ok(())
    }

    /// Removes the entry for a node, returning it if present.
    pub fn delete_state(&self, node: &ResourceNode) -> Option<ResourceEntry> {
        let removed = self.with_document(|doc| doc.remove(node));
        if removed.is_some() {
            debug!("Removed state for {node}");
        }
        removed
    }

    /// Returns every recorded entry.
    #[must_use]
    pub fn entries(&self) -> Vec<(ResourceNode, ResourceEntry)> {
        self.with_document(|doc| {
            doc.entries()
                .map(|(node, entry)| (node, entry.clone()))
                .collect()
        })
    }

    /// Lineage of the open document.
    #[must_use]
    pub fn lineage(&self) -> String {
        self.with_document(|doc| doc.lineage.clone())
    }

    /// Serial of the open document.
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.with_document(|doc| doc.serial)
    }

    /// Copy of the whole document.
    #[must_use]
    pub fn snapshot(&self) -> StateDocument {
        self.with_document(|doc| doc.clone())
    }

    /// Bumps the serial and overwrites the backing document.
    ///
    /// If the backing document changed since `open` a warning is logged and
    /// the write still goes ahead, so applied work is never dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    ///
    /// # Panics
    ///
    /// Panics when called before a successful `open`.
    pub async fn finalize(&self) -> Result<()> {
        let Some(store) = self.store.get().cloned() else {
            not_opened();
        };

        match store.load().await {
            Ok(current) => {
                let current = current.map(|doc| Synced {
                    lineage: doc.lineage,
                    serial: doc.serial,
                });
                let synced = self.synced.lock().unwrap_or_else(PoisonError::into_inner).clone();
                if current.is_some() && current != synced {
                    warn!(
                        "State at {} was modified by another process since it was opened; overwriting",
                        store.location()
                    );
                }
            }
            Err(e) => warn!("Could not re-read state before writing: {e}"),
        }

        let document = self.with_document(|doc| {
            doc.serial += 1;
            doc.last_updated = Utc::now();
            doc.clone()
        });

        store.save(&document).await?;
        *self.synced.lock().unwrap_or_else(PoisonError::into_inner) = Some(Synced {
            lineage: document.lineage.clone(),
            serial: document.serial,
        });
        info!(
            "Finalized state at {} (serial {}, {} resources)",
            store.location(),
            document.serial,
            document.len()
        );
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<StateDocument>> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_document<R>(&self, f: impl FnOnce(&mut StateDocument) -> R) -> R {
        let mut guard = self.lock();
        let Some(document) = guard.as_mut() else {
            not_opened();
        };
        f(document)
    }
}

#[allow(clippy::panic)]
#[track_caller]
fn not_opened() -> ! {
    panic!("deployment state used before open");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn state_file(temp: &TempDir) -> std::path::PathBuf {
        temp.path().join(".bundle").join("resources.json")
    }

    #[tokio::test]
    async fn test_open_fresh_and_finalize() {
        let temp = TempDir::new().expect("temp dir");
        let state = DeploymentState::new();
        state.open(state_file(&temp)).await.expect("open");

        let lineage = state.lineage();
        assert_eq!(state.serial(), 0);

        let node = ResourceNode::new("jobs", "a");
        state.save_state(&node, "101", json!({"name": "a"})).expect("save");
        state.finalize().await.expect("finalize");

        let reopened = DeploymentState::new();
        reopened.open(state_file(&temp)).await.expect("reopen");
        assert_eq!(reopened.lineage(), lineage);
        assert_eq!(reopened.serial(), 1);
        let entry = reopened.get_resource_entry(&node).expect("entry");
        assert_eq!(entry.id, "101");
        assert_eq!(entry.state["name"], "a");
    }

    #[tokio::test]
    async fn test_delete_state() {
        let temp = TempDir::new().expect("temp dir");
        let state = DeploymentState::new();
        state.open(state_file(&temp)).await.expect("open");

        let node = ResourceNode::new("jobs", "a");
        state.save_state(&node, "1", Value::Null).expect("save");
        assert!(state.delete_state(&node).is_some());
        assert!(state.get_resource_entry(&node).is_none());
        assert!(state.delete_state(&node).is_none());
        assert!(state.entries().is_empty());
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let temp = TempDir::new().expect("temp dir");
        let state = DeploymentState::new();
        state.open(state_file(&temp)).await.expect("open");

        let err = state
            .save_state(&ResourceNode::new("jobs", "a"), "", Value::Null)
            .expect_err("empty id");
        assert!(matches!(err, DeployError::State(StateError::EmptyId { .. })));
    }

    #[tokio::test]
    async fn test_open_twice_is_internal_error() {
        let temp = TempDir::new().expect("temp dir");
        let state = DeploymentState::new();
        state.open(state_file(&temp)).await.expect("open");
        let err = state.open(state_file(&temp)).await.expect_err("second open");
        assert!(matches!(err, DeployError::Internal(_)));
    }

    #[tokio::test]
    async fn test_finalize_overwrites_concurrent_change() {
        let temp = TempDir::new().expect("temp dir");
        let path = state_file(&temp);

        let first = DeploymentState::new();
        first.open(&path).await.expect("open");
        first.finalize().await.expect("finalize");

        let a = DeploymentState::new();
        a.open(&path).await.expect("open a");
        let b = DeploymentState::new();
        b.open(&path).await.expect("open b");

        a.save_state(&ResourceNode::new("jobs", "a"), "1", Value::Null).expect("save");
        a.finalize().await.expect("finalize a");
        b.save_state(&ResourceNode::new("jobs", "b"), "2", Value::Null).expect("save");
        b.finalize().await.expect("finalize b");

        let check = DeploymentState::new();
        check.open(&path).await.expect("open check");
        assert!(check.get_resource_entry(&ResourceNode::new("jobs", "b")).is_some());
        assert_eq!(check.serial(), 2);
    }

    #[test]
    #[should_panic(expected = "deployment state used before open")]
    fn test_use_before_open_panics() {
        let state = DeploymentState::new();
        let _ = state.get_resource_entry(&ResourceNode::new("jobs", "a"));
    }

    #[test]
    #[should_panic(expected = "deployment state used before open")]
    fn test_assert_opened() {
        DeploymentState::new().assert_opened();
    }
}
