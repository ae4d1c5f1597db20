//! JSON protocol: `/update`, `/value`, `/updates`.
//!
//! Bodies are parsed by hand so malformed JSON is a plain 400 with the
//! shared error body rather than an extractor rejection.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::de::DeserializeOwned;

use vigil_core::validate::validate_query;
use vigil_core::{MetricKind, MetricRecord, VigilError};

use crate::app_state::AppState;
use crate::error::ApiResult;
use crate::services::ingest;

fn parse<T: DeserializeOwned>(state: &AppState, body: &[u8]) -> Result<T, VigilError> {
    serde_json::from_slice(body).map_err(|e| {
        ingest::rejected(state, "malformed", VigilError::BadRequest(format!("invalid JSON: {e}")))
    })
}

/// Single update; echoes the accepted record.
pub async fn update(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<MetricRecord>> {
    let record: MetricRecord = parse(&state, &body)?;
    let update = ingest::apply_record(&state, &record).await?;
    Ok(Json(update.into()))
}

/// Batch update; all-or-nothing validation, echoes the batch.
///
/// A batch stored only in part answers 207 with the positions left out.
pub async fn updates(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let records: Vec<MetricRecord> = parse(&state, &body)?;
    let status = ingest::apply_batch(&state, &records).await?;
    if !status.is_complete() {
        return Ok((StatusCode::MULTI_STATUS, Json(status)).into_response());
    }
    tracing::debug!(applied = status.applied, "batch applied");
    Ok(Json(records).into_response())
}

/// Read one metric; the response carries the current value.
pub async fn value(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<MetricRecord>> {
    let query: MetricRecord = parse(&state, &body)?;
    let (kind, id) = validate_query(&query)?;

    let store = state.store();
    let record = match kind {
        MetricKind::Gauge => store.gauge(id).map(|v| MetricRecord::gauge(id, v)),
        MetricKind::Counter => store.counter(id).map(|d| MetricRecord::counter(id, d)),
    };
    record
        .map(Json)
        .ok_or_else(|| VigilError::NotFound(format!("{kind} {id}")).into())
}
