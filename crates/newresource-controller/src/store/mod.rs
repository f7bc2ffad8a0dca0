//! Collaborator contract consumed by the reconciler and the controller.
//!
//! A real deployment backs these traits with the orchestrator's API client;
//! `MemoryStore` is the in-process implementation used by the binary and tests.

pub mod memory;

use async_trait::async_trait;
use tokio::sync::broadcast;

use newresource_core::error::Result;
use newresource_core::{NewResource, ResourceIdentity};

pub use memory::MemoryStore;

/// Get/update against the resource store.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Current object, or `ControllerError::NotFound`.
    async fn get(&self, id: &ResourceIdentity) -> Result<NewResource>;

    /// Write `resource.status`. Fails with `ControllerError::Conflict` when
    /// `resource.metadata.resource_version` is stale. Returns the stored object.
    async fn update_status(&self, resource: &NewResource) -> Result<NewResource>;
}

/// Change notification keyed by identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Applied(ResourceIdentity),
    Deleted(ResourceIdentity),
}

impl WatchEvent {
    pub fn identity(&self) -> &ResourceIdentity {
        match self {
            WatchEvent::Applied(id) | WatchEvent::Deleted(id) => id,
        }
    }
}

/// Change-notification source for one resource kind.
#[async_trait]
pub trait WatchSource: Send + Sync {
    fn kind(&self) -> &'static str;

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent>;

    /// Every identity currently present; used for initial sync and relists.
    async fn list(&self) -> Result<Vec<ResourceIdentity>>;
}
