use axum::Json;
use axum::extract::State;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::models::document::ReconcileResponse;
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/reconcile",
    tag = "Maintenance",
    operation_id = "reconcileBlobs",
    summary = "Remove orphaned blobs",
    description = "Runs one sweep that deletes stored files no document refers to. \
        Files younger than the configured grace period are left alone.",
    responses(
        (status = 200, description = "Sweep report", body = ReconcileResponse),
        (status = 500, description = "Storage or database failure (INTERNAL_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state))]
pub async fn reconcile_now(
    State(state): State<AppState>,
) -> Result<Json<ReconcileResponse>, AppError> {
    let report = state.reconciler.sweep().await?;
    Ok(Json(report.into()))
}
