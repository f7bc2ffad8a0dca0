#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::watch;

use newresource_controller::config::{BackoffSection, ControllerSection, ReadinessGaugeMode};
use newresource_controller::controller::Controller;
use newresource_controller::obs::{MetricsRegistry, ReconcileMetrics};
use newresource_controller::reconciler::{NewResourceReconciler, Reconciler};
use newresource_controller::store::{MemoryStore, ResourceStore};
use newresource_core::error::Result;
use newresource_core::{ControllerError, NewResource, Requeue, ResourceIdentity};

const CTL: &str = "newresource";

fn section(workers: usize) -> ControllerSection {
    ControllerSection {
        workers,
        backoff: BackoffSection {
            base_ms: 5,
            max_ms: 50,
        },
        ..Default::default()
    }
}

fn metrics() -> Arc<ReconcileMetrics> {
    let registry = MetricsRegistry::new();
    Arc::new(ReconcileMetrics::register(&registry, "newresource", ReadinessGaugeMode::Monotonic).unwrap())
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

fn foo() -> ResourceIdentity {
    ResourceIdentity::new("default", "foo")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn watch_drives_status_to_ready() {
    let store = Arc::new(MemoryStore::new());
    store.apply(foo(), json!({ "replicas": 1 }));

    let m = metrics();
    let r = Arc::new(NewResourceReconciler::new(CTL, store.clone(), m.clone(), Duration::from_secs(1)));
    let mut controller = Controller::new(r, &section(2));
    controller.register_watch(store.clone()).unwrap();

    let (stop, stopped) = watch::channel(false);
    let running = tokio::spawn(controller.run(stopped));

    // Initial list picks up the pre-existing object.
    eventually("foo ready", || store.peek(&foo()).map(|o| o.status.ready).unwrap_or(false)).await;

    // A spec change arrives as a watch event.
    store.apply(foo(), json!({ "replicas": 2 }));
    eventually("generation 2 observed", || {
        store.peek(&foo()).and_then(|o| o.status.observed_generation) == Some(2)
    })
    .await;

    // Objects created while running are picked up too.
    let bar = ResourceIdentity::new("team-b", "bar");
    store.apply(bar.clone(), json!({}));
    eventually("bar ready", || store.peek(&bar).map(|o| o.status.ready).unwrap_or(false)).await;
    assert!(m.ready("team-b") >= 1);

    // Deletion is observed as not_found.
    store.delete(&foo());
    eventually("not_found recorded", || m.total(CTL, "not_found") >= 1).await;

    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("controller must stop")
        .unwrap()
        .unwrap();
    assert!(m.observations(CTL) >= 4);
}

/// Fails the first `failures` gets, then behaves.
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicUsize,
}

#[async_trait]
impl ResourceStore for FlakyStore {
    async fn get(&self, id: &ResourceIdentity) -> Result<NewResource> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(ControllerError::Store("transient".into()));
        }
        self.inner.get(id).await
    }

    async fn update_status(&self, resource: &NewResource) -> Result<NewResource> {
        self.inner.update_status(resource).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn errors_are_retried_with_backoff() {
    let flaky = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        failures: AtomicUsize::new(3),
    });
    flaky.inner.apply(foo(), json!({}));
    let source = Arc::new(MemoryStore::new());
    // The watch side only needs to deliver `foo` once; the rest is requeue.
    source.apply(foo(), json!({}));

    let m = metrics();
    let r = Arc::new(NewResourceReconciler::new(CTL, flaky.clone(), m.clone(), Duration::from_secs(1)));
    let mut controller = Controller::new(r, &section(1));
    let backoff = controller.backoff();
    controller.register_watch(source).unwrap();

    let (stop, stopped) = watch::channel(false);
    let running = tokio::spawn(controller.run(stopped));

    eventually("foo ready after retries", || {
        flaky.inner.peek(&foo()).map(|o| o.status.ready).unwrap_or(false)
    })
    .await;
    eventually("success recorded", || m.total(CTL, "success") == 1).await;
    assert_eq!(m.errors(CTL, "get_error"), 3);
    assert_eq!(m.total(CTL, "error"), 3);
    eventually("backoff reset", || backoff.failures(&foo()) == 0).await;

    stop.send(true).unwrap();
    running.await.unwrap().unwrap();
}

/// Records the peak number of concurrent invocations per identity.
#[derive(Default)]
struct Probe {
    in_flight: DashMap<ResourceIdentity, usize>,
    peak_same_key: AtomicUsize,
    peak_total: AtomicUsize,
    total: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl Reconciler for Probe {
    fn name(&self) -> &str {
        "probe"
    }

    async fn reconcile(&self, id: &ResourceIdentity) -> Result<Requeue> {
        let now = {
            let mut n = self.in_flight.entry(id.clone()).or_insert(0);
            *n += 1;
            *n
        };
        self.peak_same_key.fetch_max(now, Ordering::SeqCst);
        let total = self.total.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_total.fetch_max(total, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(15)).await;

        self.total.fetch_sub(1, Ordering::SeqCst);
        if let Some(mut n) = self.in_flight.get_mut(id) {
            *n -= 1;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Requeue::Never)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_invocation_per_identity_at_a_time() {
    let store = Arc::new(MemoryStore::new());
    let ids: Vec<ResourceIdentity> = (0..4)
        .map(|i| ResourceIdentity::new("default", format!("r{i}")))
        .collect();
    for id in &ids {
        store.apply(id.clone(), json!({ "rev": 0 }));
    }

    let probe = Arc::new(Probe::default());
    let mut controller = Controller::new(probe.clone(), &section(8));
    controller.register_watch(store.clone()).unwrap();
    let (stop, stopped) = watch::channel(false);
    let running = tokio::spawn(controller.run(stopped));

    for rev in 1..=20 {
        for id in &ids {
            store.apply(id.clone(), json!({ "rev": rev }));
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    eventually("queue drained", || probe.total.load(Ordering::SeqCst) == 0 && probe.calls.load(Ordering::SeqCst) >= ids.len()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(probe.peak_same_key.load(Ordering::SeqCst), 1);
    assert!(probe.peak_total.load(Ordering::SeqCst) >= 1);
    // Bursts of notifications coalesce instead of queueing one call each.
    assert!(probe.calls.load(Ordering::SeqCst) < ids.len() * 21);

    stop.send(true).unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn requeue_after_reinvokes() {
    struct Periodic {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Reconciler for Periodic {
        fn name(&self) -> &str {
            "periodic"
        }

        async fn reconcile(&self, _id: &ResourceIdentity) -> Result<Requeue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Requeue::After(Duration::from_millis(10)))
        }
    }

    let store = Arc::new(MemoryStore::new());
    store.apply(foo(), json!({}));
    let periodic = Arc::new(Periodic { calls: AtomicUsize::new(0) });
    let mut controller = Controller::new(periodic.clone(), &section(1));
    controller.register_watch(store).unwrap();
    let (stop, stopped) = watch::channel(false);
    let running = tokio::spawn(controller.run(stopped));

    eventually("several invocations", || periodic.calls.load(Ordering::SeqCst) >= 3).await;

    stop.send(true).unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn duplicate_watch_kind_rejected() {
    let store = Arc::new(MemoryStore::new());
    let r = Arc::new(NewResourceReconciler::new(CTL, store.clone(), metrics(), Duration::from_secs(1)));
    let mut controller = Controller::new(r, &section(1));
    controller.register_watch(store.clone()).unwrap();
    match controller.register_watch(store) {
        Err(ControllerError::BadConfig(msg)) => assert!(msg.contains("NewResource")),
        other => panic!("expected BadConfig, got {other:?}"),
    }
}

#[tokio::test]
async fn run_without_watch_is_an_error() {
    let store = Arc::new(MemoryStore::new());
    let r = Arc::new(NewResourceReconciler::new(CTL, store, metrics(), Duration::from_secs(1)));
    let controller = Controller::new(r, &section(1));
    let (_stop, stopped) = watch::channel(false);
    assert!(matches!(controller.run(stopped).await, Err(ControllerError::BadConfig(_))));
}
