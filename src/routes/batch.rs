use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::models::api::{BatchStatusResponse, SubmitResponse};
use crate::models::batch::ProjectRequest;
use crate::services::queue::{BatchQueue, QueueError};

/// POST /batch/submit — Queue a list of projects for evaluation.
pub async fn submit_batch(
    State(state): State<AppState>,
    Json(projects): Json<Vec<ProjectRequest>>,
) -> Result<Json<SubmitResponse>, (StatusCode, String)> {
    match state.queue.enqueue(&projects).await {
        Ok(batch_id) => Ok(Json(SubmitResponse { batch_id })),
        Err(QueueError::Validation(reason)) => Err((StatusCode::BAD_REQUEST, reason)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to enqueue batch");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Failed to enqueue batch".to_string()))
        }
    }
}

/// GET /batch/{batch_id} — Check batch status.
pub async fn batch_status(
    State(state): State<AppState>,
    Path(batch_id): Path<i64>,
) -> Result<Json<BatchStatusResponse>, StatusCode> {
    let summary = state.queue.status_of(batch_id).await.map_err(|e| {
        tracing::error!(batch_id, error = %e, "Failed to load batch status");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let summary = summary.ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(BatchStatusResponse {
        batch_id: summary.id,
        status: summary.status.to_string(),
        size: summary.size,
        error: summary.error,
        result: summary.result,
    }))
}
