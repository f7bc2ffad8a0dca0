//! Dispatch runtime: watch sources feed a work queue drained by a worker pool.
//!
//! The queue guarantees at most one in-flight reconcile per identity; distinct
//! identities run in parallel. Errors are retried with per-key backoff.

pub mod backoff;
pub mod queue;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, info, warn};

use newresource_core::error::{ControllerError, Result};
use newresource_core::Requeue;

use crate::config::ControllerSection;
use crate::reconciler::Reconciler;
use crate::store::WatchSource;

pub use backoff::Backoff;
pub use queue::WorkQueue;

pub struct Controller {
    reconciler: Arc<dyn Reconciler>,
    queue: Arc<WorkQueue>,
    backoff: Arc<Backoff>,
    workers: usize,
    resync: Option<Duration>,
    sources: Vec<Arc<dyn WatchSource>>,
}

impl Controller {
    pub fn new(reconciler: Arc<dyn Reconciler>, cfg: &ControllerSection) -> Self {
        Self {
            reconciler,
            queue: Arc::new(WorkQueue::new()),
            backoff: Arc::new(Backoff::new(cfg.backoff.base(), cfg.backoff.max())),
            workers: cfg.workers.max(1),
            resync: cfg.resync_interval(),
            sources: Vec::new(),
        }
    }

    /// Bind change notifications of `source`'s kind to this controller's
    /// reconciler. One source per kind.
    pub fn register_watch(&mut self, source: Arc<dyn WatchSource>) -> Result<()> {
        let kind = source.kind();
        if self.sources.iter().any(|s| s.kind() == kind) {
            return Err(ControllerError::BadConfig(format!(
                "watch for kind {kind} already registered"
            )));
        }
        info!(controller = %self.reconciler.name(), kind, "watch registered");
        self.sources.push(source);
        Ok(())
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    pub fn backoff(&self) -> Arc<Backoff> {
        Arc::clone(&self.backoff)
    }

    /// Run informers and workers until `shutdown` flips to `true` (or its
    /// sender is dropped), then drain the queue and return.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if self.sources.is_empty() {
            return Err(ControllerError::BadConfig("no watch registered".into()));
        }

        let informers: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                tokio::spawn(run_informer(
                    Arc::clone(source),
                    Arc::clone(&self.queue),
                    self.resync,
                    shutdown.clone(),
                ))
            })
            .collect();

        let workers: Vec<_> = (0..self.workers)
            .map(|n| {
                tokio::spawn(run_worker(
                    n,
                    Arc::clone(&self.reconciler),
                    Arc::clone(&self.queue),
                    Arc::clone(&self.backoff),
                ))
            })
            .collect();

        info!(controller = %self.reconciler.name(), workers = self.workers, "controller started");

        wait_for_shutdown(&mut shutdown).await;
        info!(controller = %self.reconciler.name(), "controller stopping");
        self.queue.shut_down();

        for joined in join_all(informers).await.into_iter().chain(join_all(workers).await) {
            if let Err(e) = joined {
                warn!(error = %e, "controller task failed");
            }
        }
        Ok(())
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn relist(source: &dyn WatchSource, queue: &WorkQueue) {
    match source.list().await {
        Ok(ids) => {
            debug!(kind = source.kind(), count = ids.len(), "relisted");
            for id in ids {
                queue.add(id);
            }
        }
        Err(e) => warn!(kind = source.kind(), error = %e, "relist failed"),
    }
}

async fn run_informer(
    source: Arc<dyn WatchSource>,
    queue: Arc<WorkQueue>,
    resync: Option<Duration>,
    mut shutdown: watch::Receiver<bool>,
) {
    let kind = source.kind();
    // Subscribe before listing so nothing between the two is missed.
    let mut events = source.subscribe();
    relist(source.as_ref(), &queue).await;

    let mut ticker = resync.map(|period| interval_at(Instant::now() + period, period));

    loop {
        tokio::select! {
            ev = events.recv() => match ev {
                Ok(ev) => queue.add(ev.identity().clone()),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(kind, missed, "watch lagged; relisting");
                    relist(source.as_ref(), &queue).await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!(kind, "watch closed");
                    break;
                }
            },
            _ = next_tick(&mut ticker) => {
                relist(source.as_ref(), &queue).await;
            }
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }
}

async fn run_worker(
    worker: usize,
    reconciler: Arc<dyn Reconciler>,
    queue: Arc<WorkQueue>,
    backoff: Arc<Backoff>,
) {
    while let Some(id) = queue.get().await {
        match reconciler.reconcile(&id).await {
            Ok(Requeue::Never) => backoff.forget(&id),
            Ok(Requeue::After(delay)) => {
                backoff.forget(&id);
                queue.add_after(id.clone(), delay);
            }
            Err(e) => {
                let delay = backoff.next_delay(&id);
                warn!(
                    worker,
                    controller = %reconciler.name(),
                    namespace = %id.namespace,
                    name = %id.name,
                    error = %e,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "reconcile failed; requeueing"
                );
                queue.add_after(id.clone(), delay);
            }
        }
        queue.done(&id);
    }
    debug!(worker, "worker stopped");
}
