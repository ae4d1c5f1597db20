//! Validate-then-apply pipeline for inbound updates.
//!
//! Validation failures never touch the store. Storage failures surface as
//! `Internal` (HTTP 500) only while nothing has been stored; once part of a
//! batch is in, the caller gets a [`BatchStatus`] naming the elements that
//! are not, so a sender never repeats an applied counter delta.

use vigil_core::error::{Result, VigilError};
use vigil_core::validate::{validate_batch, validate_update};
use vigil_core::{BatchStatus, MetricRecord, MetricUpdate};

use crate::app_state::AppState;
use crate::config::BatchFailurePolicy;

/// Count a rejected request and hand the error back.
pub fn rejected(state: &AppState, reason: &str, err: VigilError) -> VigilError {
    state.metrics().updates_rejected.inc(&[("reason", reason)]);
    tracing::debug!(reason, error = %err, "update rejected");
    err
}

/// Apply one already validated update.
pub async fn apply(state: &AppState, update: &MetricUpdate) -> Result<()> {
    let store = state.store();
    match store.apply(update).await {
        Ok(()) => {
            state.metrics().updates_applied.inc(&[("kind", update.kind().as_str())]);
            Ok(())
        }
        Err(e) => {
            state.metrics().storage_failures.inc(&[("backend", store.kind())]);
            tracing::error!(name = %update.name(), kind = %update.kind(), error = %e, "storage write failed");
            Err(VigilError::Internal(format!("storage error: {e}")))
        }
    }
}

/// JSON single-update path.
pub async fn apply_record(state: &AppState, record: &MetricRecord) -> Result<MetricUpdate> {
    let update = validate_update(record).map_err(|e| rejected(state, "validation", e))?;
    apply(state, &update).await?;
    Ok(update)
}

/// Batch path. The whole batch is validated before anything is applied.
///
/// `Continue` tries every element; `Abort` stops at the first storage
/// failure and reports the rest as not applied. When no element was stored
/// the first storage error is returned instead.
pub async fn apply_batch(state: &AppState, records: &[MetricRecord]) -> Result<BatchStatus> {
    let updates = validate_batch(records).map_err(|e| rejected(state, "validation", e))?;
    let policy = state.cfg().ingest.batch_failure;

    let mut status = BatchStatus::default();
    let mut first_err = None;
    for (pos, update) in updates.iter().enumerate() {
        match apply(state, update).await {
            Ok(()) => status.applied += 1,
            Err(e) if policy == BatchFailurePolicy::Abort => {
                first_err.get_or_insert(e);
                status.failed.extend(pos..updates.len());
                break;
            }
            Err(e) => {
                first_err.get_or_insert(e);
                status.failed.push(pos);
            }
        }
    }

    match first_err {
        None => Ok(status),
        Some(e) if status.applied == 0 => Err(e),
        Some(_) => {
            tracing::warn!(
                applied = status.applied,
                failed = status.failed.len(),
                ?policy,
                "batch partially applied"
            );
            Ok(status)
        }
    }
}
