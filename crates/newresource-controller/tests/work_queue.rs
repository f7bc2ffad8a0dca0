#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use newresource_controller::controller::{Backoff, WorkQueue};
use newresource_core::ResourceIdentity;

fn id(name: &str) -> ResourceIdentity {
    ResourceIdentity::new("default", name)
}

#[tokio::test]
async fn repeated_adds_coalesce() {
    let q = WorkQueue::new();
    q.add(id("a"));
    q.add(id("a"));
    q.add(id("b"));
    assert_eq!(q.len(), 2);
    assert_eq!(q.get().await, Some(id("a")));
    assert_eq!(q.get().await, Some(id("b")));
    assert!(q.is_empty());
}

#[tokio::test]
async fn in_flight_key_is_deferred_until_done() {
    let q = WorkQueue::new();
    q.add(id("a"));
    let got = q.get().await.unwrap();
    assert_eq!(got, id("a"));

    q.add(id("a"));
    q.add(id("a"));
    assert_eq!(q.len(), 0, "must not hand out a key that is being processed");

    q.done(&got);
    assert_eq!(q.len(), 1);
    assert_eq!(q.get().await, Some(id("a")));
    q.done(&id("a"));
    assert!(q.is_empty());
}

#[tokio::test]
async fn get_waits_for_add() {
    let q = Arc::new(WorkQueue::new());
    let waiter = {
        let q = Arc::clone(&q);
        tokio::spawn(async move { q.get().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    q.add(id("late"));
    let got = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    assert_eq!(got, Some(id("late")));
}

#[tokio::test]
async fn shut_down_drains_then_stops() {
    let q = WorkQueue::new();
    q.add(id("a"));
    q.shut_down();
    q.add(id("b"));
    assert!(q.is_shutting_down());
    assert_eq!(q.get().await, Some(id("a")));
    q.done(&id("a"));
    assert_eq!(q.get().await, None);
}

#[tokio::test]
async fn shut_down_wakes_idle_waiters() {
    let q = Arc::new(WorkQueue::new());
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.get().await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(20)).await;
    q.shut_down();
    for w in waiters {
        let got = timeout(Duration::from_secs(1), w).await.unwrap().unwrap();
        assert_eq!(got, None);
    }
}

#[tokio::test]
async fn add_after_delays() {
    let q = Arc::new(WorkQueue::new());
    q.add_after(id("a"), Duration::from_millis(50));
    assert!(q.is_empty());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(q.len(), 1);

    q.add_after(id("b"), Duration::ZERO);
    assert_eq!(q.len(), 2);
}

#[test]
fn backoff_doubles_and_caps() {
    let b = Backoff::new(Duration::from_millis(10), Duration::from_millis(100));
    let a = id("a");
    let delays: Vec<u128> = (0..6).map(|_| b.next_delay(&a).as_millis()).collect();
    assert_eq!(delays, vec![10, 20, 40, 80, 100, 100]);
    assert_eq!(b.failures(&a), 6);

    // Other keys are independent.
    assert_eq!(b.next_delay(&id("b")), Duration::from_millis(10));

    b.forget(&a);
    assert_eq!(b.failures(&a), 0);
    assert_eq!(b.next_delay(&a), Duration::from_millis(10));
}

#[test]
fn backoff_survives_many_failures() {
    let b = Backoff::new(Duration::from_millis(5), Duration::from_secs(1000));
    let a = id("a");
    let mut last = Duration::ZERO;
    for _ in 0..100 {
        last = b.next_delay(&a);
    }
    assert_eq!(last, Duration::from_secs(1000));
}
