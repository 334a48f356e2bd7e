//! Batch worker loop.
//!
//! ```text
//! run(shutdown)
//!   loop:
//!     ├─ shutdown requested? → exit
//!     └─ run_once()
//!          ├─ reclaim_stale()        // only when a reclaim policy is configured
//!          ├─ claim_next()           // None → Idle, Err → StoreError
//!          ├─ processor.process()    // sequential, never fails per project
//!          ├─ complete(claim, outcome)  // normal path
//!          └─ fail(claim, diagnostic)   // processor panicked
//!     Idle / StoreError → sleep poll_interval (woken early by shutdown)
//! ```
//!
//! A batch in hand is always driven to a terminal write before the loop
//! looks at the shutdown signal again.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::services::processor::{panic_message, Processor};
use crate::services::queue::BatchQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Sleep between polls when nothing is claimable
    pub poll_interval: Duration,
    /// Optional stale-claim reclaim threshold
    pub reclaim_after: Option<Duration>,
}

impl WorkerConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            reclaim_after: config.reclaim_after(),
        }
    }
}

/// What a single loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    /// Nothing to claim.
    Idle,
    /// Batch completed (possibly with per-project error verdicts).
    Completed(i64),
    /// Batch marked `error`.
    Failed(i64),
    /// The queue store rejected a claim or terminal write.
    StoreError,
}

pub struct Worker {
    worker_id: Uuid,
    queue: Arc<dyn BatchQueue>,
    processor: Arc<dyn Processor>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(queue: Arc<dyn BatchQueue>, processor: Arc<dyn Processor>, config: WorkerConfig) -> Self {
        Self {
            worker_id: Uuid::new_v4(),
            queue,
            processor,
            config,
        }
    }

    pub fn worker_id(&self) -> Uuid {
        self.worker_id
    }

    /// Poll until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            worker_id = %self.worker_id,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            reclaim_after_secs = self.config.reclaim_after.map(|d| d.as_secs()),
            "Worker started"
        );

        while !shutdown.is_cancelled() {
            match self.run_once().await {
                Iteration::Completed(_) | Iteration::Failed(_) => {
                    tracing::debug!(worker_id = %self.worker_id, "Batch finished, checking for next batch");
                }
                Iteration::Idle | Iteration::StoreError => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }

        tracing::info!(worker_id = %self.worker_id, "Worker stopped");
    }

    /// One claim, process, terminal-write cycle.
    pub async fn run_once(&self) -> Iteration {
        if let Some(older_than) = self.config.reclaim_after {
            match self.queue.reclaim_stale(older_than).await {
                Ok(ids) if !ids.is_empty() => {
                    tracing::warn!(
                        worker_id = %self.worker_id,
                        batch_ids = ?ids,
                        older_than_secs = older_than.as_secs(),
                        "Reclaimed stale batches (likely due to worker crash)"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(worker_id = %self.worker_id, error = %e, "Failed to reclaim stale batches");
                }
            }
        }

        let batch = match self.queue.claim_next().await {
            Ok(Some(batch)) => batch,
            Ok(None) => {
                tracing::trace!(worker_id = %self.worker_id, "No batches available");
                return Iteration::Idle;
            }
            Err(e) => {
                tracing::error!(worker_id = %self.worker_id, error = %e, "Failed to claim batch, will retry");
                self.queue.record_error("claim", &e.to_string()).await;
                return Iteration::StoreError;
            }
        };

        tracing::info!(
            worker_id = %self.worker_id,
            batch_id = batch.id,
            projects = batch.payload.len(),
            "Processing batch"
        );

        let processed = AssertUnwindSafe(self.processor.process(batch.id, &batch.payload))
            .catch_unwind()
            .await;

        match processed {
            Ok(outcome) => match self.queue.complete(&batch, &outcome).await {
                Ok(()) => {
                    tracing::info!(
                        worker_id = %self.worker_id,
                        batch_id = batch.id,
                        projects = outcome.len(),
                        "Batch completed"
                    );
                    Iteration::Completed(batch.id)
                }
                Err(e) => {
                    tracing::error!(
                        worker_id = %self.worker_id,
                        batch_id = batch.id,
                        error = %e,
                        "Failed to store batch result"
                    );
                    self.queue
                        .record_error("complete", &format!("batch {}: {e}", batch.id))
                        .await;
                    Iteration::StoreError
                }
            },
            Err(panic) => {
                let diagnostic = format!("Batch processing failed: {}", panic_message(panic.as_ref()));
                tracing::error!(
                    worker_id = %self.worker_id,
                    batch_id = batch.id,
                    error = %diagnostic,
                    "Batch failed"
                );
                self.queue
                    .record_error("batch", &format!("batch {}: {diagnostic}", batch.id))
                    .await;

                match self.queue.fail(&batch, &diagnostic).await {
                    Ok(()) => Iteration::Failed(batch.id),
                    Err(e) => {
                        tracing::error!(
                            worker_id = %self.worker_id,
                            batch_id = batch.id,
                            error = %e,
                            "Failed to mark batch as failed"
                        );
                        Iteration::StoreError
                    }
                }
            }
        }
    }
}
