use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;

use crate::db::queries;
use crate::models::batch::{BatchSummary, ClaimedBatch, ProjectRequest};
use crate::models::verdict::VerdictRecord;

/// Durable multi-consumer batch queue.
///
/// Every mutation of a batch row goes through these operations. `claim_next`
/// hands each batch to at most one caller; `complete` and `fail` only accept
/// the current claim of a batch that is in `process`, so a terminal result is
/// written once and only by the worker that holds the batch.
#[async_trait]
pub trait BatchQueue: Send + Sync {
    async fn enqueue(&self, payload: &[ProjectRequest]) -> Result<i64, QueueError>;

    /// Returns `None` immediately when nothing is claimable.
    async fn claim_next(&self) -> Result<Option<ClaimedBatch>, QueueError>;

    async fn complete(&self, claim: &ClaimedBatch, outcome: &[VerdictRecord]) -> Result<(), QueueError>;

    async fn fail(&self, claim: &ClaimedBatch, diagnostic: &str) -> Result<(), QueueError>;

    async fn status_of(&self, batch_id: i64) -> Result<Option<BatchSummary>, QueueError>;

    /// Return batches claimed longer than `older_than` ago to `new`.
    async fn reclaim_stale(&self, older_than: Duration) -> Result<Vec<i64>, QueueError>;

    /// Record a batch-level failure in the error journal. Best effort.
    async fn record_error(&self, _scope: &str, _message: &str) {}
}

/// PostgreSQL-backed queue using `FOR UPDATE SKIP LOCKED` claims.
#[derive(Clone)]
pub struct PgBatchQueue {
    pool: PgPool,
}

impl PgBatchQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the current queue depth (batches in `new`).
    pub async fn queue_depth(&self) -> Result<i64, QueueError> {
        queries::queue_depth(&self.pool).await
    }
}

#[async_trait]
impl BatchQueue for PgBatchQueue {
    async fn enqueue(&self, payload: &[ProjectRequest]) -> Result<i64, QueueError> {
        let batch_id = queries::insert_batch(&self.pool, payload).await?;
        metrics::counter!("batches_enqueued_total").increment(1);
        tracing::info!(batch_id, size = payload.len(), "Batch enqueued");
        Ok(batch_id)
    }

    async fn claim_next(&self) -> Result<Option<ClaimedBatch>, QueueError> {
        let claimed = queries::claim_next_batch(&self.pool).await?;
        if claimed.is_some() {
            metrics::counter!("batches_claimed_total").increment(1);
        }
        Ok(claimed)
    }

    async fn complete(&self, claim: &ClaimedBatch, outcome: &[VerdictRecord]) -> Result<(), QueueError> {
        queries::complete_batch(&self.pool, claim, outcome).await?;
        metrics::counter!("batches_completed_total").increment(1);
        Ok(())
    }

    async fn fail(&self, claim: &ClaimedBatch, diagnostic: &str) -> Result<(), QueueError> {
        queries::fail_batch(&self.pool, claim, diagnostic).await?;
        metrics::counter!("batches_failed_total").increment(1);
        Ok(())
    }

    async fn status_of(&self, batch_id: i64) -> Result<Option<BatchSummary>, QueueError> {
        queries::get_batch_summary(&self.pool, batch_id).await
    }

    async fn reclaim_stale(&self, older_than: Duration) -> Result<Vec<i64>, QueueError> {
        let reclaimed = queries::reclaim_stale_batches(&self.pool, older_than).await?;
        if !reclaimed.is_empty() {
            metrics::counter!("batches_reclaimed_total").increment(reclaimed.len() as u64);
        }
        Ok(reclaimed)
    }

    async fn record_error(&self, scope: &str, message: &str) {
        metrics::counter!("errors_total", "scope" => scope.to_string()).increment(1);
        if let Err(e) = crate::db::stats_queries::record_error(&self.pool, scope, message).await {
            tracing::warn!(scope, error = %e, "Failed to write error journal entry");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Invalid batch payload: {0}")]
    Validation(String),

    #[error("Batch {id} not found in process state")]
    NotFound { id: i64 },

    #[error("Unrecognized batch status '{0}'")]
    UnknownStatus(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
