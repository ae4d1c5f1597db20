//! Inbound `Content-Encoding: gzip` decoding. Outbound compression is
//! tower-http's `CompressionLayer`.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use vigil_core::{codec, VigilError};

use crate::app_state::AppState;
use crate::error::ApiResult;
use crate::services::ingest;

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case(codec::GZIP))
}

pub async fn decode_request(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> ApiResult<Response> {
    if !is_gzip(req.headers()) {
        return Ok(next.run(req).await);
    }

    let limit = state.cfg().server.max_body_bytes;
    let (mut parts, body) = req.into_parts();
    let raw = to_bytes(body, limit)
        .await
        .map_err(|_| ingest::rejected(&state, "too_large", VigilError::PayloadTooLarge))?;
    let plain = codec::gunzip(&raw, limit).map_err(|e| ingest::rejected(&state, "gzip", e))?;

    parts.headers.remove(CONTENT_ENCODING);
    parts.headers.remove(CONTENT_LENGTH);
    Ok(next.run(Request::from_parts(parts, Body::from(plain))).await)
}
