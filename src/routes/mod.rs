use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod batch;
pub mod health;
pub mod project;
pub mod stats;

/// Build the API router.
pub fn router(state: AppState, prometheus_handle: Arc<PrometheusHandle>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/batch/submit", post(batch::submit_batch))
        .route("/batch/{batch_id}", get(batch::batch_status))
        .route("/project/{name}", get(project::project_verdict))
        .route("/stats/tokens", get(stats::token_stats))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(stats::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024)) // 2 MB limit
}
