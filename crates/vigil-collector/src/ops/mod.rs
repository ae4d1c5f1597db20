//! Operational HTTP endpoints.
//!
//! - `/healthz` : liveness
//! - `/ping`    : storage backend health (relational backend only)
//! - `/metrics` : Prometheus text format

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use vigil_core::VigilError;

use crate::app_state::AppState;
use crate::error::ApiResult;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// 200 when the database answers, 503 when it does not, 501 for backends
/// without a database.
pub async fn ping(State(state): State<AppState>) -> ApiResult<&'static str> {
    state.store().ping().await.map_err(|e| {
        tracing::warn!(backend = state.store().kind(), error = %e, "storage ping failed");
        let err = VigilError::from(e);
        match err {
            VigilError::Internal(msg) => VigilError::Unavailable(msg),
            other => other,
        }
    })?;
    Ok("OK")
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let extra = state.metrics_extra();
    let body = state.metrics().render(&extra);

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}
