//! The reconcile loop for `NewResource`.
//!
//! One invocation: fetch fresh state by identity, mark it Ready, persist the
//! status, and record outcome and duration. Nothing is carried between
//! invocations; retries come from the dispatcher requeueing on a returned
//! error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use newresource_core::error::{ControllerError, Result};
use newresource_core::{
    FailureKind, NewResource, NewResourceStatus, ReconcileOutcome, Requeue, ResourceIdentity,
};

use crate::obs::ReconcileMetrics;
use crate::store::ResourceStore;

/// A level-triggered reconciler for one resource kind.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Value of the `controller` metric label.
    fn name(&self) -> &str;

    /// Drive `id` toward its desired state. `Err` asks the dispatcher for a
    /// backoff requeue; absence of the resource is `Ok`.
    async fn reconcile(&self, id: &ResourceIdentity) -> Result<Requeue>;
}

pub struct NewResourceReconciler {
    name: String,
    store: Arc<dyn ResourceStore>,
    metrics: Arc<ReconcileMetrics>,
    request_timeout: Duration,
}

impl NewResourceReconciler {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn ResourceStore>,
        metrics: Arc<ReconcileMetrics>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            metrics,
            request_timeout,
        }
    }

    pub fn metrics(&self) -> &ReconcileMetrics {
        &self.metrics
    }

    async fn converge(&self, id: &ResourceIdentity) -> (ReconcileOutcome, Result<Requeue>) {
        let current = match bounded(self.request_timeout, "get", self.store.get(id)).await {
            Ok(r) => r,
            Err(e) if e.is_not_found() => {
                debug!(namespace = %id.namespace, name = %id.name, "resource gone; nothing to do");
                return (ReconcileOutcome::NotFound, Ok(Requeue::Never));
            }
            Err(e) => {
                warn!(namespace = %id.namespace, name = %id.name, error = %e, "get failed");
                return (ReconcileOutcome::Error(FailureKind::Fetch), Err(e));
            }
        };

        info!(name = %current.name(), namespace = %current.namespace(), "Reconciling");

        let mut next = current;
        next.status = desired_status(&next);

        match bounded(self.request_timeout, "update_status", self.store.update_status(&next)).await {
            Ok(_) => (ReconcileOutcome::Success, Ok(Requeue::Never)),
            Err(e) => {
                warn!(
                    namespace = %id.namespace,
                    name = %id.name,
                    conflict = e.is_conflict(),
                    error = %e,
                    "status update failed"
                );
                (ReconcileOutcome::Error(FailureKind::StatusUpdate), Err(e))
            }
        }
    }
}

#[async_trait]
impl Reconciler for NewResourceReconciler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn reconcile(&self, id: &ResourceIdentity) -> Result<Requeue> {
        let _timer = self.metrics.start_timer(&self.name);
        let (outcome, result) = self.converge(id).await;
        self.metrics.record(&self.name, id, outcome);
        result
    }
}

/// Convergence action: the status the resource should carry. Reads the object,
/// never touches its spec.
pub fn desired_status(resource: &NewResource) -> NewResourceStatus {
    NewResourceStatus {
        ready: true,
        observed_generation: Some(resource.metadata.generation),
    }
}

async fn bounded<T>(limit: Duration, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        ControllerError::Timeout(format!("{op} exceeded {}ms", limit.as_millis()))
    })?
}
