//! The contract a resource kind implements.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{DeployError, Result};
use crate::planner::ActionType;

/// Optional operations a resource kind supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// `update_with_id` may change the remote identifier in place.
    pub update_with_id: bool,
    /// `wait_after_create` polls until a new resource is ready.
    pub wait_after_create: bool,
    /// `wait_after_update` polls until an updated resource is ready.
    pub wait_after_update: bool,
}

impl Capabilities {
    /// No optional operations.
    pub const NONE: Self = Self {
        update_with_id: false,
        wait_after_create: false,
        wait_after_update: false,
    };
}

/// Outcome of an operation that yields a (possibly new) remote identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created<R> {
    /// Remote identifier.
    pub id: String,
    /// Remote representation, if the call returned one.
    pub remote: Option<R>,
}

impl<R> Created<R> {
    /// An identifier without a remote representation.
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            remote: None,
        }
    }

    /// An identifier with the remote representation read back.
    #[must_use]
    pub fn with_remote(id: impl Into<String>, remote: R) -> Self {
        Self {
            id: id.into(),
            remote: Some(remote),
        }
    }
}

/// One resource kind driven through the create/read/update/delete lifecycle.
///
/// `Config` is decoded from the resource's configuration subtree, turned into
/// the `State` snapshot that is sent to the remote and persisted after
/// apply. `Remote` is what reading the resource back returns.
///
/// Optional operations have default bodies and are only called when the
/// matching flag in [`Resource::CAPABILITIES`] is set.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Declared configuration.
    type Config: DeserializeOwned + Send;
    /// Persisted and diffed snapshot.
    ///
    /// A sparse snapshot (one with `force_send_fields`) must not put
    /// `skip_serializing_if` on fields that may be force-sent; diffing
    /// such a snapshot fails.
    type State: Serialize + DeserializeOwned + Send + Sync;
    /// Remote representation.
    type Remote: Serialize + Send;

    /// Optional operations implemented by this kind.
    const CAPABILITIES: Capabilities = Capabilities::NONE;

    /// Changed field paths that force an action other than `update`.
    fn field_triggers() -> &'static [(&'static str, ActionType)] {
        &[]
    }

    /// Builds the desired snapshot from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be expressed as state.
    fn prepare_state(&self, config: Self::Config) -> Result<Self::State>;

    /// Reads the remote representation.
    async fn refresh(&self, id: &str) -> Result<Self::Remote>;

    /// Creates the resource.
    async fn create(&self, state: &Self::State) -> Result<Created<Self::Remote>>;

    /// Updates the resource in place, keeping its identifier.
    async fn update(&self, id: &str, state: &Self::State) -> Result<Option<Self::Remote>>;

    /// Deletes the resource.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Updates the resource and returns its possibly new identifier.
    async fn update_with_id(&self, id: &str, _state: &Self::State) -> Result<Created<Self::Remote>> {
        Err(DeployError::internal(format!("update_with_id is not implemented (ID: {id})")))
    }

    /// Waits until a newly created resource is ready.
    async fn wait_after_create(&self, _id: &str, _state: &Self::State) -> Result<Option<Self::Remote>> {
        Ok(None)
    }

    /// Waits until an updated resource is ready.
    async fn wait_after_update(&self, _id: &str, _state: &Self::State) -> Result<Option<Self::Remote>> {
        Ok(None)
    }
}
