use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::app_state::AppState;
use crate::models::api::TokenStatsResponse;
use crate::services::budget::month_key;
use crate::services::ledger::EvaluationLedger;

/// GET /stats/tokens — Token usage for the current month.
pub async fn token_stats(State(state): State<AppState>) -> Result<Json<TokenStatsResponse>, StatusCode> {
    let month = month_key(state.clock.now());

    let load = async {
        let tokens_used = state.ledger.tokens_used(&month).await?;
        let calls = state.ledger.calls(&month).await?;
        Ok::<_, sqlx::Error>((tokens_used, calls))
    };

    let (tokens_used, calls) = load.await.map_err(|e| {
        tracing::error!(month = %month, error = %e, "Failed to load token usage");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(TokenStatsResponse {
        spent_usd: state.budget.cost_usd(tokens_used),
        budget_usd: state.budget.monthly_usd,
        month,
        tokens_used,
        calls,
    }))
}

/// GET /metrics — Prometheus text exposition.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
