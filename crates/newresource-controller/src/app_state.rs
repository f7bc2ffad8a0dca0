//! Shared application state for the controller process.
//!
//! Built once at startup: registers the metric set (a name collision is a
//! startup error), seeds the in-memory store, and hands out the reconciler
//! and controller wired to them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use newresource_core::error::Result;
use newresource_core::ResourceIdentity;

use crate::config::ControllerConfig;
use crate::controller::Controller;
use crate::obs::{MetricsRegistry, ReconcileMetrics};
use crate::reconciler::NewResourceReconciler;
use crate::store::MemoryStore;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: ControllerConfig,
    registry: MetricsRegistry,
    metrics: Arc<ReconcileMetrics>,
    store: Arc<MemoryStore>,
    draining: AtomicBool,
}

impl AppState {
    pub fn new(cfg: ControllerConfig) -> Result<Self> {
        let registry = MetricsRegistry::new();
        let metrics = Arc::new(ReconcileMetrics::register(
            &registry,
            &cfg.metrics.prefix,
            cfg.metrics.readiness_gauge,
        )?);

        let store = Arc::new(MemoryStore::new());
        for seed in &cfg.store.seed {
            store.apply(
                ResourceIdentity::new(seed.namespace.as_str(), seed.name.as_str()),
                seed.spec.clone(),
            );
        }
        tracing::info!(seeded = store.len(), "store ready");

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                registry,
                metrics,
                store,
                draining: AtomicBool::new(false),
            }),
        })
    }

    pub fn cfg(&self) -> &ControllerConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.inner.registry
    }

    pub fn metrics(&self) -> Arc<ReconcileMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.inner.store)
    }

    pub fn reconciler(&self) -> Arc<NewResourceReconciler> {
        let c = &self.inner.cfg.controller;
        Arc::new(NewResourceReconciler::new(
            c.name.clone(),
            self.store(),
            self.metrics(),
            c.request_timeout(),
        ))
    }

    /// Controller with the store registered as its watch source.
    pub fn build_controller(&self) -> Result<Controller> {
        let mut controller = Controller::new(self.reconciler(), &self.inner.cfg.controller);
        controller.register_watch(self.store())?;
        Ok(controller)
    }

    pub fn set_draining(&self) {
        self.inner.draining.store(true, Ordering::Relaxed);
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Relaxed)
    }
}
