//! Minimal metrics registry for the controller.
//!
//! Counter/gauge/histogram families carry a fixed label schema and are backed
//! by `DashMap` so concurrent reconciles can write without a global lock.
//! Labels are flattened into sorted key vectors to keep deterministic
//! ordering. Histogram samples are accumulated as integer microseconds and
//! rendered in seconds.

use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use newresource_core::error::{ControllerError, Result};

type LabelKey = Vec<(String, String)>;

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Build the map key for a sample, or `None` if `labels` does not match
/// `schema` exactly (same names, each once).
fn label_key(schema: &[&'static str], labels: &[(&str, &str)]) -> Option<LabelKey> {
    if labels.len() != schema.len() {
        return None;
    }
    if !schema.iter().all(|name| labels.iter().any(|(k, _)| k == name)) {
        return None;
    }
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    Some(key)
}

fn schema_mismatch(schema: &[&'static str], labels: &[(&str, &str)]) {
    tracing::warn!(
        expected = ?schema,
        got = ?labels.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
        "label set does not match metric schema; sample dropped"
    );
}

fn render_labels(key: &LabelKey) -> String {
    key.iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

fn sample_line(out: &mut String, name: &str, labels: &str, value: impl std::fmt::Display) {
    if labels.is_empty() {
        let _ = writeln!(out, "{} {}", name, value);
    } else {
        let _ = writeln!(out, "{}{{{}}} {}", name, labels, value);
    }
}

/// Prometheus metric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// A metric family the registry can render.
pub trait Collector: Send + Sync {
    fn kind(&self) -> MetricKind;
    fn label_names(&self) -> &[&'static str];
    /// Append samples (no `# HELP`/`# TYPE` header) in text exposition format.
    fn render(&self, name: &str, out: &mut String);
}

pub struct CounterVec {
    schema: &'static [&'static str],
    map: DashMap<LabelKey, AtomicU64>,
}

impl CounterVec {
    pub fn new(schema: &'static [&'static str]) -> Self {
        Self {
            schema,
            map: DashMap::new(),
        }
    }

    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    /// Increment by an arbitrary value.
    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        let Some(key) = label_key(self.schema, labels) else {
            schema_mismatch(self.schema, labels);
            return;
        };
        let counter = self.map.entry(key).or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    /// Current value; 0 for a label set never written.
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        label_key(self.schema, labels)
            .and_then(|key| self.map.get(&key).map(|c| c.load(Ordering::Relaxed)))
            .unwrap_or(0)
    }
}

impl Collector for CounterVec {
    fn kind(&self) -> MetricKind {
        MetricKind::Counter
    }

    fn label_names(&self) -> &[&'static str] {
        self.schema
    }

    fn render(&self, name: &str, out: &mut String) {
        let mut rows: Vec<(String, u64)> = self
            .map
            .iter()
            .map(|r| (render_labels(r.key()), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort();
        for (labels, val) in rows {
            sample_line(out, name, &labels, val);
        }
    }
}

pub struct GaugeVec {
    schema: &'static [&'static str],
    map: DashMap<LabelKey, AtomicI64>,
}

impl GaugeVec {
    pub fn new(schema: &'static [&'static str]) -> Self {
        Self {
            schema,
            map: DashMap::new(),
        }
    }

    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) { self.add(labels, 1); }
    /// Decrement by 1.
    pub fn dec(&self, labels: &[(&str, &str)]) { self.add(labels, -1); }

    /// Add an arbitrary signed delta.
    pub fn add(&self, labels: &[(&str, &str)], v: i64) {
        let Some(key) = label_key(self.schema, labels) else {
            schema_mismatch(self.schema, labels);
            return;
        };
        let gauge = self.map.entry(key).or_insert_with(|| AtomicI64::new(0));
        gauge.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> i64 {
        label_key(self.schema, labels)
            .and_then(|key| self.map.get(&key).map(|g| g.load(Ordering::Relaxed)))
            .unwrap_or(0)
    }
}

impl Collector for GaugeVec {
    fn kind(&self) -> MetricKind {
        MetricKind::Gauge
    }

    fn label_names(&self) -> &[&'static str] {
        self.schema
    }

    fn render(&self, name: &str, out: &mut String) {
        let mut rows: Vec<(String, i64)> = self
            .map
            .iter()
            .map(|r| (render_labels(r.key()), r.value().load(Ordering::Relaxed)))
            .collect();
        rows.sort();
        for (labels, val) in rows {
            sample_line(out, name, &labels, val);
        }
    }
}

// Default Prometheus buckets, in microseconds:
// 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const BUCKETS_MICROS: [u64; 11] = [
    5_000, 10_000, 25_000, 50_000, 100_000, 250_000, 500_000, 1_000_000, 2_500_000, 5_000_000,
    10_000_000,
];

fn micros_as_seconds(micros: u64) -> f64 {
    micros as f64 / 1_000_000.0
}

struct AtomicHistogram {
    count: AtomicU64,
    sum_micros: AtomicU64,
    buckets: [AtomicU64; BUCKETS_MICROS.len()],
}

impl Default for AtomicHistogram {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_micros: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

pub struct HistogramVec {
    schema: &'static [&'static str],
    map: DashMap<LabelKey, AtomicHistogram>,
}

impl HistogramVec {
    pub fn new(schema: &'static [&'static str]) -> Self {
        Self {
            schema,
            map: DashMap::new(),
        }
    }

    /// Observe a duration and increment cumulative buckets.
    pub fn observe(&self, labels: &[(&str, &str)], duration: Duration) {
        let Some(key) = label_key(self.schema, labels) else {
            schema_mismatch(self.schema, labels);
            return;
        };
        let hist = self.map.entry(key).or_insert_with(AtomicHistogram::default);
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);

        hist.count.fetch_add(1, Ordering::Relaxed);
        hist.sum_micros.fetch_add(micros, Ordering::Relaxed);

        for (bucket, &le) in hist.buckets.iter().zip(BUCKETS_MICROS.iter()) {
            if micros <= le {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Number of observations for a label set.
    pub fn count(&self, labels: &[(&str, &str)]) -> u64 {
        label_key(self.schema, labels)
            .and_then(|key| self.map.get(&key).map(|h| h.count.load(Ordering::Relaxed)))
            .unwrap_or(0)
    }

    pub fn sum_seconds(&self, labels: &[(&str, &str)]) -> f64 {
        label_key(self.schema, labels)
            .and_then(|key| {
                self.map
                    .get(&key)
                    .map(|h| micros_as_seconds(h.sum_micros.load(Ordering::Relaxed)))
            })
            .unwrap_or(0.0)
    }
}

impl Collector for HistogramVec {
    fn kind(&self) -> MetricKind {
        MetricKind::Histogram
    }

    fn label_names(&self) -> &[&'static str] {
        self.schema
    }

    fn render(&self, name: &str, out: &mut String) {
        let mut keys: Vec<LabelKey> = self.map.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        for key in keys {
            let Some(hist) = self.map.get(&key) else { continue };
            let label_str = render_labels(&key);
            let prefix = if label_str.is_empty() { String::new() } else { format!("{},", label_str) };

            for (bucket, &le) in hist.buckets.iter().zip(BUCKETS_MICROS.iter()) {
                let _ = writeln!(
                    out,
                    "{}_bucket{{{}le=\"{}\"}} {}",
                    name,
                    prefix,
                    micros_as_seconds(le),
                    bucket.load(Ordering::Relaxed)
                );
            }
            let count = hist.count.load(Ordering::Relaxed);
            let _ = writeln!(out, "{}_bucket{{{}le=\"+Inf\"}} {}", name, prefix, count);

            let sum = micros_as_seconds(hist.sum_micros.load(Ordering::Relaxed));
            sample_line(out, &format!("{name}_sum"), &label_str, sum);
            sample_line(out, &format!("{name}_count"), &label_str, count);
        }
    }
}

struct Registered {
    help: String,
    collector: Arc<dyn Collector>,
}

/// Name -> metric family. Families are registered once at startup and live
/// for the whole process; there is no unregister.
#[derive(Default)]
pub struct MetricsRegistry {
    metrics: DashMap<String, Registered>,
}

fn valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a family under `name`. Fails on a name collision.
    pub fn register(&self, name: &str, help: &str, collector: Arc<dyn Collector>) -> Result<()> {
        if !valid_metric_name(name) {
            return Err(ControllerError::BadConfig(format!("invalid metric name: {name:?}")));
        }
        match self.metrics.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ControllerError::AlreadyRegistered(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Registered {
                    help: help.to_string(),
                    collector,
                });
                Ok(())
            }
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.metrics.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Render every family in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for name in self.names() {
            let Some(entry) = self.metrics.get(&name) else { continue };
            let _ = writeln!(out, "# HELP {} {}", name, escape_help(&entry.help));
            let _ = writeln!(out, "# TYPE {} {}", name, entry.collector.kind().as_str());
            entry.collector.render(&name, &mut out);
        }
        out
    }
}
