use sqlx::{PgPool, Row};

use crate::services::budget::{Budget, BudgetExceeded};

/// Longest message kept in the error journal.
const MAX_ERROR_MESSAGE_LEN: usize = 8000;

pub fn tokens_metric(month: &str) -> String {
    format!("tokens_used:{month}")
}

pub fn calls_metric(month: &str) -> String {
    format!("evaluation_calls:{month}")
}

/// Current value of a counter; absent counters read as zero.
pub async fn get_stat(pool: &PgPool, metric: &str) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT value FROM stats WHERE metric = $1")
        .bind(metric)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(r) => r.try_get("value"),
        None => Ok(0),
    }
}

/// Add usage for one completion call: tokens plus one call, in a single transaction.
/// `tokens` may be negative when settling a reservation that overestimated.
///
/// Returns the month's token total after the increment.
pub async fn add_usage(pool: &PgPool, month: &str, tokens: i64) -> Result<i64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"
        INSERT INTO stats (metric, value)
        VALUES ($1, $2)
        ON CONFLICT (metric)
        DO UPDATE SET value = stats.value + EXCLUDED.value
        RETURNING value
        "#,
    )
    .bind(tokens_metric(month))
    .bind(tokens)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO stats (metric, value)
        VALUES ($1, 1)
        ON CONFLICT (metric)
        DO UPDATE SET value = stats.value + 1
        "#,
    )
    .bind(calls_metric(month))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    row.try_get("value")
}

/// Add `tokens` to the month's counter if the budget allows it.
///
/// The counter row is locked for the check, so concurrent reservations are
/// decided one at a time against the running total. Returns the new total,
/// or the rejection with nothing added.
pub async fn reserve_tokens(
    pool: &PgPool,
    month: &str,
    tokens: i64,
    budget: &Budget,
) -> Result<Result<i64, BudgetExceeded>, sqlx::Error> {
    let metric = tokens_metric(month);
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO stats (metric, value) VALUES ($1, 0) ON CONFLICT (metric) DO NOTHING")
        .bind(&metric)
        .execute(&mut *tx)
        .await?;

    let row = sqlx::query("SELECT value FROM stats WHERE metric = $1 FOR UPDATE")
        .bind(&metric)
        .fetch_one(&mut *tx)
        .await?;
    let used: i64 = row.try_get("value")?;

    if let Err(exceeded) = budget.check(used, tokens) {
        tx.rollback().await?;
        return Ok(Err(exceeded));
    }

    sqlx::query("UPDATE stats SET value = value + $2 WHERE metric = $1")
        .bind(&metric)
        .bind(tokens)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Ok(used + tokens))
}

/// Give back a reservation whose call was never billed.
pub async fn release_tokens(pool: &PgPool, month: &str, tokens: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE stats SET value = value - $2 WHERE metric = $1")
        .bind(tokens_metric(month))
        .bind(tokens)
        .execute(pool)
        .await?;

    Ok(())
}

/// Append an entry to the error journal.
pub async fn record_error(pool: &PgPool, scope: &str, message: &str) -> Result<(), sqlx::Error> {
    let message: String = message.chars().take(MAX_ERROR_MESSAGE_LEN).collect();

    sqlx::query("INSERT INTO errors (scope, message, ts) VALUES ($1, $2, NOW())")
        .bind(scope)
        .bind(message)
        .execute(pool)
        .await?;

    Ok(())
}
