use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use newresource_core::ResourceIdentity;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<ResourceIdentity>,
    /// Keys waiting to be handed out (queued, or re-added while processing).
    dirty: HashSet<ResourceIdentity>,
    /// Keys currently held by a worker.
    processing: HashSet<ResourceIdentity>,
    shutting_down: bool,
}

/// De-duplicating work queue of resource identities.
///
/// - a key is queued at most once; repeated notifications coalesce
/// - a key handed to a worker is not handed out again until `done`; a re-add
///   in the meantime is deferred and queued by `done`
/// - after `shut_down`, remaining keys still drain, new keys are ignored and
///   `get` returns `None` once empty
#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, id: ResourceIdentity) {
        let mut s = self.lock();
        if s.shutting_down || !s.dirty.insert(id.clone()) {
            return;
        }
        if s.processing.contains(&id) {
            return;
        }
        s.queue.push_back(id);
        drop(s);
        self.notify.notify_one();
    }

    /// Add after `delay` without blocking the caller.
    pub fn add_after(self: &Arc<Self>, id: ResourceIdentity, delay: Duration) {
        if delay.is_zero() {
            self.add(id);
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(id);
        });
    }

    /// Next key to process; `None` once shut down and drained.
    pub async fn get(&self) -> Option<ResourceIdentity> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut s = self.lock();
                if let Some(id) = s.queue.pop_front() {
                    s.dirty.remove(&id);
                    s.processing.insert(id.clone());
                    let more = !s.queue.is_empty();
                    drop(s);
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(id);
                }
                if s.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Release a key taken with `get`.
    pub fn done(&self, id: &ResourceIdentity) {
        let mut s = self.lock();
        s.processing.remove(id);
        if s.dirty.contains(id) {
            s.queue.push_back(id.clone());
            drop(s);
            self.notify.notify_one();
        }
    }

    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Keys waiting to be handed out.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
