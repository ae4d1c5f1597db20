//! Plain-text path protocol: `/update/{kind}/{name}/{value}` and
//! `/value/{kind}/{name}`.

use axum::extract::{Path, State};

use vigil_core::{MetricKind, MetricUpdate, VigilError};

use crate::app_state::AppState;
use crate::error::ApiResult;
use crate::services::ingest;

pub async fn update(
    State(state): State<AppState>,
    Path((kind, name, raw)): Path<(String, String, String)>,
) -> ApiResult<&'static str> {
    let update = MetricUpdate::from_text(&kind, &name, &raw)
        .map_err(|e| ingest::rejected(&state, "validation", e))?;
    ingest::apply(&state, &update).await?;
    Ok("OK")
}

/// Unknown kinds are 404 here, not 400: the path names no resource.
pub async fn value(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> ApiResult<String> {
    let kind: MetricKind = kind
        .parse()
        .map_err(|_| VigilError::NotFound(format!("unknown metric type {kind:?}")))?;

    let store = state.store();
    let found = match kind {
        MetricKind::Gauge => store.gauge(&name).map(|v| v.to_string()),
        MetricKind::Counter => store.counter(&name).map(|v| v.to_string()),
    };
    found.ok_or_else(|| VigilError::NotFound(format!("{kind} {name}")).into())
}
