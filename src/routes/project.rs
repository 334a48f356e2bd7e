use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::models::api::JudgementResponse;
use crate::services::ledger::EvaluationLedger;

/// GET /project/{name} — Latest verdict for a project.
pub async fn project_verdict(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<JudgementResponse>, StatusCode> {
    let judgement = state.ledger.judgement(&name).await.map_err(|e| {
        tracing::error!(project = %name, error = %e, "Failed to load judgement");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let judgement = judgement.ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(JudgementResponse {
        project: judgement.project,
        verdict: judgement.verdict.to_string(),
        text: judgement.text,
    }))
}
