//! Metric data model: kinds, wire records, validated updates and snapshots.
//!
//! `MetricRecord` is the JSON shape shared by the HTTP protocol and the file
//! backend (`{"id", "type", "delta"?, "value"?}`). It is deliberately loose
//! (`type` stays a string, both payload fields optional) so that contradictory
//! input reaches the validation layer instead of failing inside serde.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VigilError};

/// Metric kind. A gauge and a counter may share a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = VigilError;

    /// Case-insensitive, matching the legacy URL protocol.
    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("gauge") {
            Ok(MetricKind::Gauge)
        } else if s.eq_ignore_ascii_case("counter") {
            Ok(MetricKind::Counter)
        } else {
            Err(VigilError::BadRequest(format!("unknown metric type: {s:?}")))
        }
    }
}

/// JSON wire/file record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    /// Field name is `type` in JSON.
    #[serde(rename = "type")]
    pub mtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricRecord {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            mtype: MetricKind::Gauge.as_str().to_string(),
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            mtype: MetricKind::Counter.as_str().to_string(),
            delta: Some(delta),
            value: None,
        }
    }
}

/// A validated, typed update ready to be applied to a store.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricUpdate {
    Gauge { name: String, value: f64 },
    Counter { name: String, delta: i64 },
}

impl MetricUpdate {
    pub fn name(&self) -> &str {
        match self {
            MetricUpdate::Gauge { name, .. } | MetricUpdate::Counter { name, .. } => name,
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricUpdate::Gauge { .. } => MetricKind::Gauge,
            MetricUpdate::Counter { .. } => MetricKind::Counter,
        }
    }

    /// Build an update from the legacy `/update/{kind}/{name}/{value}` path segments.
    pub fn from_text(kind: &str, name: &str, raw: &str) -> Result<Self> {
        let kind: MetricKind = kind.parse()?;
        if name.is_empty() {
            return Err(VigilError::BadRequest("metric name must not be empty".into()));
        }
        match kind {
            MetricKind::Gauge => {
                let value = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| VigilError::BadRequest(format!("gauge value must be a finite float: {raw:?}")))?;
                Ok(MetricUpdate::Gauge { name: name.to_string(), value })
            }
            MetricKind::Counter => {
                let delta = raw.parse::<i64>().map_err(|_| {
                    VigilError::BadRequest(format!("counter delta must be an integer: {raw:?}"))
                })?;
                Ok(MetricUpdate::Counter { name: name.to_string(), delta })
            }
        }
    }
}

impl From<MetricUpdate> for MetricRecord {
    fn from(u: MetricUpdate) -> Self {
        match u {
            MetricUpdate::Gauge { name, value } => MetricRecord::gauge(name, value),
            MetricUpdate::Counter { name, delta } => MetricRecord::counter(name, delta),
        }
    }
}

/// Reply body of `/updates` when only part of a batch was stored
/// (HTTP 207). Positions index into the request batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatus {
    pub applied: usize,
    /// Elements that were not stored and are safe to send again.
    pub failed: Vec<usize>,
}

impl BatchStatus {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Full, internally consistent copy of every metric at one instant.
///
/// Ordered maps make equality and rendering deterministic; the order itself
/// carries no meaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub gauges: BTreeMap<String, f64>,
    pub counters: BTreeMap<String, i64>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }

    /// Flatten into wire records, gauges first. Counters carry their
    /// accumulator in `delta`.
    pub fn to_records(&self) -> Vec<MetricRecord> {
        let gauges = self.gauges.iter().map(|(k, v)| MetricRecord::gauge(k.clone(), *v));
        let counters = self.counters.iter().map(|(k, v)| MetricRecord::counter(k.clone(), *v));
        gauges.chain(counters).collect()
    }

    /// Rebuild from persisted records. Records of an unknown type or without
    /// their payload field are skipped.
    pub fn from_records(records: Vec<MetricRecord>) -> Self {
        let mut snap = Snapshot::default();
        for r in records {
            match (r.mtype.parse::<MetricKind>(), r.value, r.delta) {
                (Ok(MetricKind::Gauge), Some(v), _) => {
                    snap.gauges.insert(r.id, v);
                }
                (Ok(MetricKind::Counter), _, Some(d)) => {
                    snap.counters.insert(r.id, d);
                }
                _ => {
                    tracing::warn!(id = %r.id, mtype = %r.mtype, "skipping unusable persisted record");
                }
            }
        }
        snap
    }
}
