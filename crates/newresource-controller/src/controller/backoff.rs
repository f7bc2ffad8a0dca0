use std::time::Duration;

use dashmap::DashMap;

use newresource_core::ResourceIdentity;

/// Per-key exponential backoff: `base * 2^failures`, capped at `max`.
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: DashMap<ResourceIdentity, u32>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: DashMap::new(),
        }
    }

    /// Delay before the next retry of `id`; counts one more failure.
    pub fn next_delay(&self, id: &ResourceIdentity) -> Duration {
        let mut failures = self.failures.entry(id.clone()).or_insert(0);
        let exp = *failures;
        *failures = failures.saturating_add(1);

        2u32.checked_pow(exp)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |d| d.min(self.max))
    }

    pub fn failures(&self, id: &ResourceIdentity) -> u32 {
        self.failures.get(id).map(|f| *f).unwrap_or(0)
    }

    /// Reset after a success.
    pub fn forget(&self, id: &ResourceIdentity) {
        self.failures.remove(id);
    }
}
