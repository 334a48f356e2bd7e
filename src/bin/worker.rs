use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use airdrop_screen::{
    config::AppConfig,
    db,
    services::{
        budget::SystemClock,
        evaluation::{EvaluationGateway, EvaluationSettings},
        ledger::PgLedger,
        llm::OpenAiClient,
        processor::BatchProcessor,
        prompt::PromptBuilder,
        queue::PgBatchQueue,
        worker::{Worker, WorkerConfig},
    },
    telemetry,
};

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    tracing::info!("Starting airdrop-screen worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    if let Some(addr) = config.worker_metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .expect("Failed to install Prometheus exporter");
        telemetry::describe_metrics();
        tracing::info!(%addr, "Worker metrics listener started");
    }

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let prompts = PromptBuilder::from_config(&config).expect("Failed to load prompt inputs");

    let gateway = EvaluationGateway::new(
        Arc::new(OpenAiClient::new(&config.openai_base_url, &config.openai_api_key)),
        Arc::new(PgLedger::new(db_pool.clone())),
        Arc::new(SystemClock),
        prompts,
        EvaluationSettings::from_config(&config),
    );

    let worker = Worker::new(
        Arc::new(PgBatchQueue::new(db_pool)),
        Arc::new(BatchProcessor::new(Arc::new(gateway))),
        WorkerConfig::from_config(&config),
    );

    tracing::info!(
        worker_id = %worker.worker_id(),
        model = %config.openai_model,
        "Worker ready, starting batch processing loop"
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        telemetry::shutdown_signal().await;
        tracing::info!("Shutdown requested, finishing current batch");
        signal_token.cancel();
    });

    worker.run(shutdown).await;
}
