//! Inbound validation contract for the JSON protocol.
//!
//! Rules for a single record:
//! - `id` must not be empty.
//! - gauge: `value` required and finite, `delta` forbidden.
//! - counter: `delta` required, `value` forbidden.
//! - any other `type` is rejected.
//!
//! Batches are all-or-nothing: every element is validated before any of them
//! is handed back, so a caller never applies a prefix of an invalid batch.

use crate::error::{Result, VigilError};
use crate::metric::{MetricKind, MetricRecord, MetricUpdate};

/// Validate one JSON update record.
pub fn validate_update(r: &MetricRecord) -> Result<MetricUpdate> {
    if r.id.is_empty() {
        return Err(VigilError::BadRequest("missing metric id".into()));
    }

    let kind: MetricKind = r
        .mtype
        .parse()
        .map_err(|_| VigilError::BadRequest(format!("unknown metric type for {}", r.id)))?;

    match kind {
        MetricKind::Gauge => {
            if r.delta.is_some() {
                return Err(VigilError::BadRequest(format!(
                    "unexpected 'delta' for gauge metric {}",
                    r.id
                )));
            }
            let value = r.value.ok_or_else(|| {
                VigilError::BadRequest(format!("missing 'value' for gauge metric {}", r.id))
            })?;
            if !value.is_finite() {
                return Err(VigilError::BadRequest(format!("non-finite 'value' for gauge metric {}", r.id)));
            }
            Ok(MetricUpdate::Gauge { name: r.id.clone(), value })
        }
        MetricKind::Counter => {
            if r.value.is_some() {
                return Err(VigilError::BadRequest(format!(
                    "unexpected 'value' for counter metric {}",
                    r.id
                )));
            }
            let delta = r.delta.ok_or_else(|| {
                VigilError::BadRequest(format!("missing 'delta' for counter metric {}", r.id))
            })?;
            Ok(MetricUpdate::Counter { name: r.id.clone(), delta })
        }
    }
}

/// Validate a whole batch; the first invalid element rejects all of it.
pub fn validate_batch(records: &[MetricRecord]) -> Result<Vec<MetricUpdate>> {
    if records.is_empty() {
        return Err(VigilError::BadRequest("empty batch not allowed".into()));
    }
    records.iter().map(validate_update).collect()
}

/// Validate a JSON read request (`{"id", "type"}`).
pub fn validate_query(r: &MetricRecord) -> Result<(MetricKind, &str)> {
    if r.id.is_empty() || r.mtype.is_empty() {
        return Err(VigilError::BadRequest("missing id or type".into()));
    }
    let kind = r.mtype.parse()?;
    Ok((kind, r.id.as_str()))
}
