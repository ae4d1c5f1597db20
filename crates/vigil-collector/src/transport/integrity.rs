//! `HashSHA256` request verification and response signing.
//!
//! Requests are verified over the exact bytes received, before any
//! decoding. Only requests that carry a body are checked; reads (`GET`,
//! `HEAD`) pass through. Responses are signed over the body as produced by
//! the handler, i.e. before content encoding.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;

use vigil_core::VigilError;

use crate::app_state::AppState;
use crate::error::ApiResult;
use crate::services::ingest;

pub const SIGNATURE: HeaderName = HeaderName::from_static("hashsha256");

pub async fn verify_request(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> ApiResult<Response> {
    let Some(guard) = state.guard() else {
        return Ok(next.run(req).await);
    };
    if req.method() == Method::GET || req.method() == Method::HEAD {
        return Ok(next.run(req).await);
    }

    let (parts, body) = req.into_parts();
    let raw = to_bytes(body, state.cfg().server.max_body_bytes)
        .await
        .map_err(|_| ingest::rejected(&state, "too_large", VigilError::PayloadTooLarge))?;

    let sig = parts.headers.get(&SIGNATURE).and_then(|v| v.to_str().ok());
    guard
        .verify(&raw, sig)
        .map_err(|e| ingest::rejected(&state, "integrity", e))?;

    Ok(next.run(Request::from_parts(parts, Body::from(raw))).await)
}

pub async fn sign_response(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> ApiResult<Response> {
    let resp = next.run(req).await;
    let Some(guard) = state.guard() else {
        return Ok(resp);
    };

    let (mut parts, body) = resp.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|e| VigilError::Internal(format!("buffer response failed: {e}")))?;
    let sig = HeaderValue::from_str(&guard.sign(&bytes))
        .map_err(|e| VigilError::Internal(format!("signature header: {e}")))?;
    parts.headers.insert(SIGNATURE, sig);
    Ok(Response::from_parts(parts, Body::from(bytes)))
}
