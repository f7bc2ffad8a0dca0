use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use newresource_core::error::{ControllerError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    pub version: u32,

    #[serde(default)]
    pub controller: ControllerSection,

    #[serde(default)]
    pub metrics: MetricsSection,

    #[serde(default)]
    pub store: StoreSection,
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ControllerError::BadConfig(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.controller.validate()?;
        self.metrics.validate()?;
        self.store.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerSection {
    /// Value of the `controller` metric label.
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Deadline applied to each store call.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Periodic relist of every watched identity; 0 disables.
    #[serde(default)]
    pub resync_interval_ms: u64,

    #[serde(default)]
    pub backoff: BackoffSection,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            workers: default_workers(),
            request_timeout_ms: default_request_timeout_ms(),
            resync_interval_ms: 0,
            backoff: BackoffSection::default(),
        }
    }
}

impl ControllerSection {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(ControllerError::BadConfig(
                "controller.name must be non-empty [A-Za-z0-9._-]".into(),
            ));
        }
        if !(1..=256).contains(&self.workers) {
            return Err(ControllerError::BadConfig(
                "controller.workers must be between 1 and 256".into(),
            ));
        }
        if !(100..=600000).contains(&self.request_timeout_ms) {
            return Err(ControllerError::BadConfig(
                "controller.request_timeout_ms must be between 100 and 600000".into(),
            ));
        }
        if self.resync_interval_ms != 0 && self.resync_interval_ms < 1000 {
            return Err(ControllerError::BadConfig(
                "controller.resync_interval_ms must be 0 or at least 1000".into(),
            ));
        }
        self.backoff.validate()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_ms > 0).then(|| Duration::from_millis(self.resync_interval_ms))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffSection {
    #[serde(default = "default_backoff_base_ms")]
    pub base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            base_ms: default_backoff_base_ms(),
            max_ms: default_backoff_max_ms(),
        }
    }
}

impl BackoffSection {
    pub fn validate(&self) -> Result<()> {
        if self.base_ms == 0 {
            return Err(ControllerError::BadConfig(
                "controller.backoff.base_ms must be greater than 0".into(),
            ));
        }
        if self.max_ms < self.base_ms {
            return Err(ControllerError::BadConfig(
                "controller.backoff.max_ms must be >= base_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

/// How `resources_ready` reacts to reconcile outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessGaugeMode {
    /// +1 on every successful reconcile, never decremented.
    #[default]
    Monotonic,
    /// +1 the first time an identity converges, -1 once it is observed gone.
    Live,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Prepended to every metric name as `<prefix>_`; empty for none.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub readiness_gauge: ReadinessGaugeMode,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            prefix: default_prefix(),
            readiness_gauge: ReadinessGaugeMode::default(),
        }
    }
}

impl MetricsSection {
    pub fn validate(&self) -> Result<()> {
        self.listen.parse::<SocketAddr>().map_err(|e| {
            ControllerError::BadConfig(format!("metrics.listen must be a valid SocketAddr: {e}"))
        })?;
        let mut chars = self.prefix.chars();
        let ok = match chars.next() {
            None => true,
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            Some(_) => false,
        };
        if !ok {
            return Err(ControllerError::BadConfig(
                "metrics.prefix must match [A-Za-z_][A-Za-z0-9_]*".into(),
            ));
        }
        Ok(())
    }
}

/// Resources preloaded into the in-memory store at startup.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    #[serde(default)]
    pub seed: Vec<SeedResource>,
}

impl StoreSection {
    pub fn validate(&self) -> Result<()> {
        for s in &self.seed {
            if s.namespace.is_empty() || s.name.is_empty() {
                return Err(ControllerError::BadConfig(
                    "store.seed entries need namespace and name".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedResource {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub spec: Value,
}

fn default_name() -> String {
    "newresource".into()
}
fn default_workers() -> usize {
    4
}
fn default_request_timeout_ms() -> u64 {
    10000
}
fn default_backoff_base_ms() -> u64 {
    5
}
fn default_backoff_max_ms() -> u64 {
    1_000_000
}
fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_prefix() -> String {
    "newresource".into()
}
