use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use vigil_core::error::{Result, VigilError};
use vigil_core::Backoff;
use vigil_store::{DbConfig, StoreConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectorConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub ingest: IngestSection,

    /// Shared HMAC key; empty disables signing and verification.
    #[serde(default)]
    pub key: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            server: ServerSection::default(),
            storage: StorageSection::default(),
            ingest: IngestSection::default(),
            key: String::new(),
        }
    }
}

impl CollectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(VigilError::BadRequest(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        self.server.validate()?;
        self.storage.validate()?;
        Ok(())
    }

    /// Apply the environment overrides of the collector flag set.
    ///
    /// `lookup` is `std::env::var` in the binary and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ADDRESS") {
            self.server.listen = v;
        }
        if let Some(v) = lookup("STORE_INTERVAL") {
            self.storage.store_interval_secs = parse_env("STORE_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("FILE_STORAGE_PATH") {
            self.storage.file_storage_path = v;
        }
        if let Some(v) = lookup("RESTORE") {
            self.storage.restore = parse_env("RESTORE", &v)?;
        }
        if let Some(v) = lookup("DATABASE_DSN") {
            self.storage.database_dsn = v;
        }
        if let Some(v) = lookup("KEY") {
            self.key = v;
        }
        self.validate()
    }

    /// Backend selection: DSN first, then file path, else memory.
    pub fn store_config(&self) -> StoreConfig {
        let s = &self.storage;
        if !s.database_dsn.is_empty() {
            return StoreConfig::Database(DbConfig {
                dsn: s.database_dsn.clone(),
                max_connections: s.db_max_connections,
                connect_timeout: Duration::from_millis(s.db_connect_timeout_ms),
                ping_timeout: Duration::from_millis(s.ping_timeout_ms),
                backoff: Backoff::from_secs(&s.retry_schedule_secs),
            });
        }
        if !s.file_storage_path.is_empty() {
            return StoreConfig::File {
                path: PathBuf::from(&s.file_storage_path),
                interval: Duration::from_secs(s.store_interval_secs),
                restore: s.restore,
            };
        }
        StoreConfig::Memory
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| VigilError::BadRequest(format!("invalid value for {name}: {raw:?}")))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerSection {
    pub fn validate(&self) -> Result<()> {
        if self.listen.trim().is_empty() {
            return Err(VigilError::BadRequest("server.listen must not be empty".into()));
        }
        if !(1024..=64 * 1024 * 1024).contains(&self.max_body_bytes) {
            return Err(VigilError::BadRequest(
                "server.max_body_bytes must be between 1024 and 67108864".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    /// 0 = save the file after every mutation.
    #[serde(default = "default_store_interval_secs")]
    pub store_interval_secs: u64,

    #[serde(default = "default_file_storage_path")]
    pub file_storage_path: String,

    #[serde(default = "default_true")]
    pub restore: bool,

    #[serde(default)]
    pub database_dsn: String,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_connect_timeout_ms")]
    pub db_connect_timeout_ms: u64,

    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,

    /// Pre-attempt delays for database writes.
    #[serde(default = "default_retry_schedule_secs")]
    pub retry_schedule_secs: Vec<u64>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            store_interval_secs: default_store_interval_secs(),
            file_storage_path: default_file_storage_path(),
            restore: true,
            database_dsn: String::new(),
            db_max_connections: default_db_max_connections(),
            db_connect_timeout_ms: default_db_connect_timeout_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
            retry_schedule_secs: default_retry_schedule_secs(),
        }
    }
}

impl StorageSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=256).contains(&self.db_max_connections) {
            return Err(VigilError::BadRequest(
                "storage.db_max_connections must be between 1 and 256".into(),
            ));
        }
        if !(100..=60_000).contains(&self.db_connect_timeout_ms) {
            return Err(VigilError::BadRequest(
                "storage.db_connect_timeout_ms must be between 100 and 60000".into(),
            ));
        }
        if !(100..=30_000).contains(&self.ping_timeout_ms) {
            return Err(VigilError::BadRequest(
                "storage.ping_timeout_ms must be between 100 and 30000".into(),
            ));
        }
        if self.retry_schedule_secs.len() > 10 || self.retry_schedule_secs.iter().any(|s| *s > 60) {
            return Err(VigilError::BadRequest(
                "storage.retry_schedule_secs allows at most 10 entries of at most 60s".into(),
            ));
        }
        Ok(())
    }
}

/// What the batch endpoint does when a storage write fails mid-batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchFailurePolicy {
    /// Apply every element, then report the first failure.
    #[default]
    Continue,
    /// Stop at the first failure.
    Abort,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestSection {
    #[serde(default)]
    pub batch_failure: BatchFailurePolicy,
}

fn default_version() -> u32 {
    1
}
fn default_listen() -> String {
    "localhost:8080".into()
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}
fn default_store_interval_secs() -> u64 {
    300
}
fn default_file_storage_path() -> String {
    "/tmp/metrics.json".into()
}
fn default_true() -> bool {
    true
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_connect_timeout_ms() -> u64 {
    5000
}
fn default_ping_timeout_ms() -> u64 {
    2000
}
fn default_retry_schedule_secs() -> Vec<u64> {
    vec![0, 1, 3, 5]
}
