use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::app_state::AppState;

/// One log line and one request/latency sample per request.
pub async fn access_log(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let resp = next.run(req).await;

    let elapsed = start.elapsed();
    let status = resp.status();
    let metrics = state.metrics();
    metrics.http_requests.inc(&[("route", &route), ("status", status.as_str())]);
    metrics.http_duration.observe(&[("route", &route)], elapsed);

    tracing::info!(
        %method,
        %path,
        status = status.as_u16(),
        latency_us = elapsed.as_micros() as u64,
        "request"
    );
    resp
}
