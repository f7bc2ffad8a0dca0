//! newresource core: resource data model, reconcile outcomes, and the shared
//! error type.
//!
//! This crate defines the contracts shared by the controller runtime, the
//! store collaborators, and tests. It carries no async runtime or transport
//! dependencies so a real orchestrator client can be plugged in around it.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod outcome;
pub mod resource;

/// Shared result type.
pub use error::{ControllerError, Result};
pub use outcome::{FailureKind, ReconcileOutcome, Requeue};
pub use resource::{NewResource, NewResourceStatus, ObjectMeta, ResourceIdentity};
