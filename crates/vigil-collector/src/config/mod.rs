//! Collector config loader (strict parsing, env overrides).

pub mod schema;

use std::fs;
use std::io;

use vigil_core::error::{Result, VigilError};

pub use schema::{BatchFailurePolicy, CollectorConfig, IngestSection, ServerSection, StorageSection};

/// Default config path when none is given on the command line.
pub const DEFAULT_PATH: &str = "vigil-collector.yaml";

/// Read and validate a config file. A missing file yields the defaults.
pub fn load_from_file(path: &str) -> Result<CollectorConfig> {
    match fs::read_to_string(path) {
        Ok(s) => load_from_str(&s),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!(%path, "config file not found, using defaults");
            let cfg = CollectorConfig::default();
            cfg.validate()?;
            Ok(cfg)
        }
        Err(e) => Err(VigilError::Internal(format!("read config failed: {e}"))),
    }
}

pub fn load_from_str(s: &str) -> Result<CollectorConfig> {
    // An empty document is the all-defaults config.
    if s.trim().is_empty() {
        return Ok(CollectorConfig::default());
    }
    let cfg: CollectorConfig = serde_yaml::from_str(s)
        .map_err(|e| VigilError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// File (or defaults) plus process environment.
pub fn load(path: &str) -> Result<CollectorConfig> {
    let mut cfg = load_from_file(path)?;
    cfg.apply_env(|k| std::env::var(k).ok())?;
    Ok(cfg)
}
