//! Metric set written by the reconcile loop.
//!
//! | name                          | kind      | labels                  |
//! |-------------------------------|-----------|-------------------------|
//! | `<prefix>_reconcile_total`            | counter   | controller, result      |
//! | `<prefix>_reconcile_duration_seconds` | histogram | controller              |
//! | `<prefix>_reconcile_errors_total`     | counter   | controller, error_type  |
//! | `<prefix>_resources_ready`            | gauge     | namespace               |

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashSet;

use newresource_core::error::Result;
use newresource_core::{ReconcileOutcome, ResourceIdentity};

pub use crate::config::schema::ReadinessGaugeMode;

use super::metrics::{CounterVec, GaugeVec, HistogramVec, MetricsRegistry};

const RESULT_LABELS: &[&str] = &["controller", "result"];
const DURATION_LABELS: &[&str] = &["controller"];
const ERROR_LABELS: &[&str] = &["controller", "error_type"];
const READY_LABELS: &[&str] = &["namespace"];

fn metric_name(prefix: &str, base: &str) -> String {
    if prefix.is_empty() {
        base.to_string()
    } else {
        format!("{prefix}_{base}")
    }
}

pub struct ReconcileMetrics {
    pub reconcile_total: Arc<CounterVec>,
    pub reconcile_duration: Arc<HistogramVec>,
    pub reconcile_errors: Arc<CounterVec>,
    pub resources_ready: Arc<GaugeVec>,
    gauge_mode: ReadinessGaugeMode,
    /// Identities currently counted in `resources_ready` (live mode only).
    ready: DashSet<ResourceIdentity>,
}

impl ReconcileMetrics {
    /// Create the metric set and register it. Call once per process; a second
    /// call against the same registry fails with `AlreadyRegistered`.
    pub fn register(
        registry: &MetricsRegistry,
        prefix: &str,
        gauge_mode: ReadinessGaugeMode,
    ) -> Result<Self> {
        let m = Self {
            reconcile_total: Arc::new(CounterVec::new(RESULT_LABELS)),
            reconcile_duration: Arc::new(HistogramVec::new(DURATION_LABELS)),
            reconcile_errors: Arc::new(CounterVec::new(ERROR_LABELS)),
            resources_ready: Arc::new(GaugeVec::new(READY_LABELS)),
            gauge_mode,
            ready: DashSet::new(),
        };

        registry.register(
            &metric_name(prefix, "reconcile_total"),
            "Total number of reconciliations per controller",
            m.reconcile_total.clone(),
        )?;
        registry.register(
            &metric_name(prefix, "reconcile_duration_seconds"),
            "Duration of reconciliations in seconds",
            m.reconcile_duration.clone(),
        )?;
        registry.register(
            &metric_name(prefix, "reconcile_errors_total"),
            "Total number of reconciliation errors",
            m.reconcile_errors.clone(),
        )?;
        registry.register(
            &metric_name(prefix, "resources_ready"),
            "Number of NewResource objects with ready status",
            m.resources_ready.clone(),
        )?;

        Ok(m)
    }

    pub fn gauge_mode(&self) -> ReadinessGaugeMode {
        self.gauge_mode
    }

    /// Start timing one invocation. The observation is made when the guard drops.
    pub fn start_timer<'a>(&'a self, controller: &'a str) -> ReconcileTimer<'a> {
        ReconcileTimer {
            histogram: &self.reconcile_duration,
            controller,
            start: Instant::now(),
        }
    }

    /// Record the outcome of one invocation: the result counter, the error
    /// counter on failure, and the readiness gauge on success.
    pub fn record(&self, controller: &str, id: &ResourceIdentity, outcome: ReconcileOutcome) {
        if let Some(kind) = outcome.failure() {
            self.reconcile_errors
                .inc(&[("controller", controller), ("error_type", kind.as_label())]);
        }
        match outcome {
            ReconcileOutcome::Success => self.mark_ready(id),
            ReconcileOutcome::NotFound => self.mark_gone(id),
            ReconcileOutcome::Error(_) => {}
        }
        self.reconcile_total
            .inc(&[("controller", controller), ("result", outcome.as_label())]);
    }

    fn mark_ready(&self, id: &ResourceIdentity) {
        let namespace = [("namespace", id.namespace.as_str())];
        match self.gauge_mode {
            ReadinessGaugeMode::Monotonic => self.resources_ready.inc(&namespace),
            ReadinessGaugeMode::Live => {
                if self.ready.insert(id.clone()) {
                    self.resources_ready.inc(&namespace);
                }
            }
        }
    }

    fn mark_gone(&self, id: &ResourceIdentity) {
        if self.gauge_mode == ReadinessGaugeMode::Live && self.ready.remove(id).is_some() {
            self.resources_ready.dec(&[("namespace", id.namespace.as_str())]);
        }
    }

    pub fn total(&self, controller: &str, result: &str) -> u64 {
        self.reconcile_total
            .get(&[("controller", controller), ("result", result)])
    }

    pub fn errors(&self, controller: &str, error_type: &str) -> u64 {
        self.reconcile_errors
            .get(&[("controller", controller), ("error_type", error_type)])
    }

    pub fn ready(&self, namespace: &str) -> i64 {
        self.resources_ready.get(&[("namespace", namespace)])
    }

    pub fn observations(&self, controller: &str) -> u64 {
        self.reconcile_duration.count(&[("controller", controller)])
    }
}

/// Scope guard for the duration histogram; observes exactly once on drop,
/// whichever way the invocation exits.
#[must_use = "the duration is recorded when the timer is dropped"]
pub struct ReconcileTimer<'a> {
    histogram: &'a HistogramVec,
    controller: &'a str,
    start: Instant,
}

impl Drop for ReconcileTimer<'_> {
    fn drop(&mut self) {
        self.histogram
            .observe(&[("controller", self.controller)], self.start.elapsed());
    }
}
