//! Shared error type across newresource crates.

use thiserror::Error;

use crate::resource::ResourceIdentity;

/// Shared result type.
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Unified error type used by core and controller.
#[derive(Debug, Clone, Error)]
pub enum ControllerError {
    #[error("resource {0} not found")]
    NotFound(ResourceIdentity),
    #[error("conflict on {id}: expected resource version {expected}, found {actual}")]
    Conflict {
        id: ResourceIdentity,
        expected: u64,
        actual: u64,
    },
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("store: {0}")]
    Store(String),
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("metric already registered: {0}")]
    AlreadyRegistered(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ControllerError {
    /// Absence of the resource; benign for a reconcile.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ControllerError::NotFound(_))
    }

    /// Stale write rejected by optimistic concurrency.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ControllerError::Conflict { .. })
    }
}
