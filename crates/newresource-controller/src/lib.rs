//! newresource controller library entry.
//!
//! This crate wires the metrics registry, the reconcile loop, the store
//! collaborator, and the dispatch runtime into a runnable controller. It is
//! consumed by the binary (`main.rs`) and by integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app_state;
pub mod config;
pub mod controller;
pub mod obs;
pub mod ops;
pub mod reconciler;
pub mod router;
pub mod store;
