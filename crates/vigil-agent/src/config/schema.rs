use std::time::Duration;

use serde::Deserialize;
use vigil_core::error::{Result, VigilError};
use vigil_core::Backoff;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub collector: CollectorSection,

    #[serde(default)]
    pub reporting: ReportingSection,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            collector: CollectorSection::default(),
            reporting: ReportingSection::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(VigilError::BadRequest(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        self.collector.validate()?;
        self.reporting.validate()?;
        Ok(())
    }

    /// Apply the environment overrides of the agent flag set.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ADDRESS") {
            self.collector.address = v;
        }
        if let Some(v) = lookup("POLL_INTERVAL") {
            self.reporting.poll_interval_secs = parse_env("POLL_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("REPORT_INTERVAL") {
            self.reporting.report_interval_secs = parse_env("REPORT_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("KEY") {
            self.collector.key = v;
        }
        self.validate()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.reporting.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.reporting.report_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.collector.request_timeout_ms)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::from_secs(&self.reporting.retry_schedule_secs)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| VigilError::BadRequest(format!("invalid value for {name}: {raw:?}")))
}

/// Wire protocol used to talk to the collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Gzipped JSON batch with per-metric fallback.
    #[default]
    Json,
    /// One `POST /update/{kind}/{name}/{value}` per metric, uncompressed.
    Legacy,
}

/// What the next tick does after a failed batch send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Try the batch endpoint first on every tick.
    #[default]
    RetryBatch,
    /// After one failed batch, send per metric for the rest of the process.
    StayDegraded,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectorSection {
    /// `host:port`, or a full `http://` base URL.
    #[serde(default = "default_address")]
    pub address: String,

    /// Shared HMAC key; empty disables signing.
    #[serde(default)]
    pub key: String,

    #[serde(default)]
    pub protocol: Protocol,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for CollectorSection {
    fn default() -> Self {
        Self {
            address: default_address(),
            key: String::new(),
            protocol: Protocol::default(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl CollectorSection {
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(VigilError::BadRequest("collector.address must not be empty".into()));
        }
        if !(100..=120_000).contains(&self.request_timeout_ms) {
            return Err(VigilError::BadRequest(
                "collector.request_timeout_ms must be between 100 and 120000".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportingSection {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,

    #[serde(default)]
    pub fallback: FallbackPolicy,

    /// Pre-attempt delays for every send.
    #[serde(default = "default_retry_schedule_secs")]
    pub retry_schedule_secs: Vec<u64>,
}

impl Default for ReportingSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            report_interval_secs: default_report_interval_secs(),
            fallback: FallbackPolicy::default(),
            retry_schedule_secs: default_retry_schedule_secs(),
        }
    }
}

impl ReportingSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=3600).contains(&self.poll_interval_secs) {
            return Err(VigilError::BadRequest(
                "reporting.poll_interval_secs must be between 1 and 3600".into(),
            ));
        }
        if !(1..=86_400).contains(&self.report_interval_secs) {
            return Err(VigilError::BadRequest(
                "reporting.report_interval_secs must be between 1 and 86400".into(),
            ));
        }
        if self.retry_schedule_secs.len() > 10 || self.retry_schedule_secs.iter().any(|s| *s > 60) {
            return Err(VigilError::BadRequest(
                "reporting.retry_schedule_secs allows at most 10 entries of at most 60s".into(),
            ));
        }
        Ok(())
    }
}

fn default_version() -> u32 {
    1
}
fn default_address() -> String {
    "localhost:8080".into()
}
fn default_request_timeout_ms() -> u64 {
    5000
}
fn default_poll_interval_secs() -> u64 {
    2
}
fn default_report_interval_secs() -> u64 {
    10
}
fn default_retry_schedule_secs() -> Vec<u64> {
    vec![0, 1, 3, 5]
}
