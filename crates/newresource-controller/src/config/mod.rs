//! Controller config loader (strict parsing).

pub mod schema;

use std::fs;

use newresource_core::error::{ControllerError, Result};

pub use schema::{
    BackoffSection, ControllerConfig, ControllerSection, MetricsSection, ReadinessGaugeMode,
    SeedResource, StoreSection,
};

pub fn load_from_file(path: &str) -> Result<ControllerConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| ControllerError::Internal(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ControllerConfig> {
    let cfg: ControllerConfig = serde_yaml::from_str(s)
        .map_err(|e| ControllerError::BadConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
