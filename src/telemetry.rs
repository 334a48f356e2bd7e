//! Process-level logging, metric registration and signal handling shared by
//! the API server and the worker binary.

use tokio::signal;
use tracing_subscriber::EnvFilter;

/// JSON logs filtered by `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();
}

/// Register descriptions for every metric the crate emits.
pub fn describe_metrics() {
    metrics::describe_counter!("batches_enqueued_total", "Batches accepted into the queue");
    metrics::describe_counter!("batches_claimed_total", "Batches claimed by a worker");
    metrics::describe_counter!("batches_completed_total", "Batches that reached done");
    metrics::describe_counter!("batches_failed_total", "Batches that reached error");
    metrics::describe_counter!(
        "batches_reclaimed_total",
        "Stale in-process batches returned to new"
    );
    metrics::describe_gauge!("batch_queue_depth", "Batches waiting in new");
    metrics::describe_histogram!(
        "batch_processing_seconds",
        "Wall time to evaluate every project in a batch"
    );
    metrics::describe_counter!("evaluations_total", "Project evaluations by verdict");
    metrics::describe_counter!(
        "evaluation_retries_total",
        "Completion calls retried after a transient failure"
    );
    metrics::describe_counter!(
        "evaluation_tokens_total",
        "Tokens charged to the monthly budget"
    );
    metrics::describe_counter!(
        "budget_rejections_total",
        "Evaluations refused because the monthly budget would be exceeded"
    );
    metrics::describe_counter!("errors_total", "Entries written to the error journal by scope");
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM");
        },
    }
}
