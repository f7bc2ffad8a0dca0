//! In-process metrics.
//!
//! `metrics` holds the label-aware primitives and the registry that renders
//! them for `/metrics`. `reconcile` defines the reconcile loop's metric set.

pub mod metrics;
pub mod reconcile;

pub use metrics::{Collector, CounterVec, GaugeVec, HistogramVec, MetricKind, MetricsRegistry};
pub use reconcile::{ReconcileMetrics, ReconcileTimer};
