use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::time::Duration;

use crate::models::batch::{validate_payload, Batch, BatchStatus, BatchSummary, ClaimedBatch, ProjectRequest};
use crate::models::verdict::VerdictRecord;
use crate::services::queue::QueueError;

fn parse_status(raw: &str) -> Result<BatchStatus, QueueError> {
    BatchStatus::from_str(raw).map_err(|_| QueueError::UnknownStatus(raw.to_string()))
}

/// Insert a new batch in `new` state and return its id.
pub async fn insert_batch(pool: &PgPool, payload: &[ProjectRequest]) -> Result<i64, QueueError> {
    validate_payload(payload).map_err(QueueError::Validation)?;

    let row = sqlx::query(
        r#"
        INSERT INTO batches (status, payload)
        VALUES ('new', $1)
        RETURNING id
        "#,
    )
    .bind(Json(payload))
    .fetch_one(pool)
    .await?;

    Ok(row.try_get("id")?)
}

/// Claim the oldest `new` batch and flip it to `process` in one statement.
///
/// Rows locked by a concurrent claimant are skipped, so racing workers never
/// block each other and never receive the same batch.
pub async fn claim_next_batch(pool: &PgPool) -> Result<Option<ClaimedBatch>, QueueError> {
    let row = sqlx::query(
        r#"
        UPDATE batches
        SET status = 'process',
            claimed_at = NOW()
        WHERE id = (
            SELECT id
            FROM batches
            WHERE status = 'new'
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
          AND status = 'new'
        RETURNING id, claimed_at, payload
        "#,
    )
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => {
            let Json(payload): Json<Vec<ProjectRequest>> = r.try_get("payload")?;
            Ok(Some(ClaimedBatch {
                id: r.try_get("id")?,
                claimed_at: r.try_get("claimed_at")?,
                payload,
            }))
        }
        None => Ok(None),
    }
}

/// Record a successful outcome. Only the current claim of a batch in
/// `process` can complete it.
pub async fn complete_batch(
    pool: &PgPool,
    claim: &ClaimedBatch,
    result: &[VerdictRecord],
) -> Result<(), QueueError> {
    let updated = sqlx::query(
        r#"
        UPDATE batches
        SET status = 'done',
            result = $2,
            finished_at = NOW()
        WHERE id = $1
          AND status = 'process'
          AND claimed_at = $3
        "#,
    )
    .bind(claim.id)
    .bind(Json(result))
    .bind(claim.claimed_at)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(QueueError::NotFound { id: claim.id });
    }
    Ok(())
}

/// Record a batch-level failure. Only the current claim of a batch in
/// `process` can fail it.
pub async fn fail_batch(pool: &PgPool, claim: &ClaimedBatch, error: &str) -> Result<(), QueueError> {
    let updated = sqlx::query(
        r#"
        UPDATE batches
        SET status = 'error',
            error = $2,
            finished_at = NOW()
        WHERE id = $1
          AND status = 'process'
          AND claimed_at = $3
        "#,
    )
    .bind(claim.id)
    .bind(error)
    .bind(claim.claimed_at)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(QueueError::NotFound { id: claim.id });
    }
    Ok(())
}

/// Status projection for external queries.
pub async fn get_batch_summary(pool: &PgPool, batch_id: i64) -> Result<Option<BatchSummary>, QueueError> {
    let row = sqlx::query(
        r#"
        SELECT id, status, created_at, error, result,
               jsonb_array_length(payload)::BIGINT AS size
        FROM batches
        WHERE id = $1
        "#,
    )
    .bind(batch_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => {
            let status_str: String = r.try_get("status")?;
            let result: Option<Json<Vec<VerdictRecord>>> = r.try_get("result")?;
            Ok(Some(BatchSummary {
                id: r.try_get("id")?,
                status: parse_status(&status_str)?,
                size: r.try_get("size")?,
                created_at: r.try_get("created_at")?,
                error: r.try_get("error")?,
                result: result.map(|Json(records)| records),
            }))
        }
        None => Ok(None),
    }
}

/// Full batch row including its payload.
pub async fn get_batch(pool: &PgPool, batch_id: i64) -> Result<Option<Batch>, QueueError> {
    let row = sqlx::query(
        r#"
        SELECT id, created_at, status, payload, result, error
        FROM batches
        WHERE id = $1
        "#,
    )
    .bind(batch_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => {
            let status_str: String = r.try_get("status")?;
            let Json(payload): Json<Vec<ProjectRequest>> = r.try_get("payload")?;
            let result: Option<Json<Vec<VerdictRecord>>> = r.try_get("result")?;
            Ok(Some(Batch {
                id: r.try_get("id")?,
                created_at: r.try_get("created_at")?,
                status: parse_status(&status_str)?,
                payload,
                result: result.map(|Json(records)| records),
                error: r.try_get("error")?,
            }))
        }
        None => Ok(None),
    }
}

/// Return batches stuck in `process` longer than `older_than` to `new`.
pub async fn reclaim_stale_batches(pool: &PgPool, older_than: Duration) -> Result<Vec<i64>, QueueError> {
    let rows = sqlx::query(
        r#"
        UPDATE batches
        SET status = 'new',
            claimed_at = NULL
        WHERE status = 'process'
          AND claimed_at < NOW() - make_interval(secs => $1)
        RETURNING id
        "#,
    )
    .bind(older_than.as_secs_f64())
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| r.try_get::<i64, _>("id").map_err(QueueError::from))
        .collect()
}

/// Number of batches waiting to be claimed.
pub async fn queue_depth(pool: &PgPool) -> Result<i64, QueueError> {
    let row = sqlx::query("SELECT COUNT(*) AS depth FROM batches WHERE status = 'new'")
        .fetch_one(pool)
        .await?;

    Ok(row.try_get("depth")?)
}
