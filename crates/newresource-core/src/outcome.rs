//! Per-invocation reconcile outcome and requeue directive.

use std::time::Duration;

/// Which step of the loop failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Get-by-identity failed with anything other than not-found.
    Fetch,
    /// Status write failed (conflict, timeout, or store error).
    StatusUpdate,
}

impl FailureKind {
    /// Value of the `error_type` metric label.
    pub fn as_label(self) -> &'static str {
        match self {
            FailureKind::Fetch => "get_error",
            FailureKind::StatusUpdate => "status_update_error",
        }
    }
}

/// Outcome of exactly one reconcile invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Success,
    NotFound,
    Error(FailureKind),
}

impl ReconcileOutcome {
    /// Value of the `result` metric label.
    pub fn as_label(self) -> &'static str {
        match self {
            ReconcileOutcome::Success => "success",
            ReconcileOutcome::NotFound => "not_found",
            ReconcileOutcome::Error(_) => "error",
        }
    }

    pub fn failure(self) -> Option<FailureKind> {
        match self {
            ReconcileOutcome::Error(kind) => Some(kind),
            _ => None,
        }
    }
}

/// What the dispatcher should do with the key after a successful reconcile.
/// Errors are not expressed here: a returned error always means backoff requeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Requeue {
    /// Wait for the next change notification.
    #[default]
    Never,
    /// Re-invoke after a fixed delay.
    After(Duration),
}
