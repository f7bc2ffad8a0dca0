use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;

use newresource_core::error::{ControllerError, Result};
use newresource_core::{NewResource, ResourceIdentity};

use super::{ResourceStore, WatchEvent, WatchSource};

const EVENT_BUFFER: usize = 1024;

/// In-memory object store with optimistic concurrency.
///
/// Every effective write bumps a store-wide `resource_version` and broadcasts
/// a `WatchEvent`. Writes that change nothing are no-ops, so a reconcile that
/// re-applies an already converged status does not trigger another round.
pub struct MemoryStore {
    objects: DashMap<ResourceIdentity, NewResource>,
    version: AtomicU64,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            objects: DashMap::new(),
            version: AtomicU64::new(0),
            events,
        }
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    fn notify(&self, ev: WatchEvent) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.events.send(ev);
    }

    /// Create the object or replace its spec. Status is left alone; the
    /// generation moves only when the spec actually changes.
    pub fn apply(&self, id: ResourceIdentity, spec: Value) -> NewResource {
        let (snapshot, changed) = match self.objects.entry(id.clone()) {
            Entry::Occupied(mut slot) => {
                let obj = slot.get_mut();
                let changed = obj.spec != spec;
                if changed {
                    obj.spec = spec;
                    obj.metadata.generation = obj.metadata.generation.wrapping_add(1);
                    obj.metadata.resource_version = self.next_version();
                }
                (obj.clone(), changed)
            }
            Entry::Vacant(slot) => {
                let mut obj = NewResource::new(id.clone(), spec);
                obj.metadata.generation = 1;
                obj.metadata.resource_version = self.next_version();
                (slot.insert(obj).value().clone(), true)
            }
        };
        if changed {
            tracing::debug!(namespace = %id.namespace, name = %id.name, "applied");
            self.notify(WatchEvent::Applied(id));
        }
        snapshot
    }

    pub fn delete(&self, id: &ResourceIdentity) -> Option<NewResource> {
        let removed = self.objects.remove(id).map(|(_, obj)| obj);
        if removed.is_some() {
            tracing::debug!(namespace = %id.namespace, name = %id.name, "deleted");
            self.notify(WatchEvent::Deleted(id.clone()));
        }
        removed
    }

    /// Snapshot without going through the async contract.
    pub fn peek(&self, id: &ResourceIdentity) -> Option<NewResource> {
        self.objects.get(id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, id: &ResourceIdentity) -> Result<NewResource> {
        self.peek(id)
            .ok_or_else(|| ControllerError::NotFound(id.clone()))
    }

    async fn update_status(&self, resource: &NewResource) -> Result<NewResource> {
        let id = resource.identity();
        let updated = {
            let mut stored = self
                .objects
                .get_mut(id)
                .ok_or_else(|| ControllerError::NotFound(id.clone()))?;

            let actual = stored.metadata.resource_version;
            if actual != resource.metadata.resource_version {
                return Err(ControllerError::Conflict {
                    id: id.clone(),
                    expected: resource.metadata.resource_version,
                    actual,
                });
            }
            if stored.status == resource.status {
                return Ok(stored.value().clone());
            }

            stored.status = resource.status.clone();
            stored.metadata.resource_version = self.next_version();
            stored.value().clone()
        };
        self.notify(WatchEvent::Applied(id.clone()));
        Ok(updated)
    }
}

#[async_trait]
impl WatchSource for MemoryStore {
    fn kind(&self) -> &'static str {
        NewResource::KIND
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }

    async fn list(&self) -> Result<Vec<ResourceIdentity>> {
        let mut ids: Vec<ResourceIdentity> = self.objects.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}
