use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;

use airdrop_screen::{
    app_state::AppState,
    config::AppConfig,
    db, routes,
    services::budget::Budget,
    telemetry,
};

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing airdrop-screen API server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    telemetry::describe_metrics();

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let budget = Budget::new(config.monthly_budget_usd, config.cost_per_1k_tokens);
    let state = AppState::new(db_pool, budget);

    let app = routes::router(state, prometheus_handle);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server stopped");
}
