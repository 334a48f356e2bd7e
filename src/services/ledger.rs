use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::{judgement_queries, stats_queries};
use crate::models::verdict::Judgement;
use crate::services::budget::{Budget, BudgetExceeded};

/// Persistent side effects of evaluations: monthly usage counters and the
/// latest judgement per project.
///
/// Counter updates are single atomic upserts, so concurrent evaluators in any
/// number of processes never lose an increment.
#[async_trait]
pub trait EvaluationLedger: Send + Sync {
    async fn tokens_used(&self, month: &str) -> Result<i64, sqlx::Error>;

    async fn calls(&self, month: &str) -> Result<i64, sqlx::Error>;

    /// Add one call and `tokens` to the month, returning the new token total.
    /// A negative `tokens` settles a reservation that was larger than the bill.
    async fn record_usage(&self, month: &str, tokens: i64) -> Result<i64, sqlx::Error>;

    /// Atomically check `budget` against the month total and add `tokens`
    /// if it passes. No two reservations can both pass on the same headroom.
    async fn reserve_tokens(
        &self,
        month: &str,
        tokens: i64,
        budget: &Budget,
    ) -> Result<Result<i64, BudgetExceeded>, sqlx::Error>;

    /// Undo a reservation whose call produced no billable response.
    async fn release_tokens(&self, month: &str, tokens: i64) -> Result<(), sqlx::Error>;

    async fn upsert_judgement(&self, judgement: &Judgement) -> Result<(), sqlx::Error>;

    async fn judgement(&self, project: &str) -> Result<Option<Judgement>, sqlx::Error>;
}

#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EvaluationLedger for PgLedger {
    async fn tokens_used(&self, month: &str) -> Result<i64, sqlx::Error> {
        stats_queries::get_stat(&self.pool, &stats_queries::tokens_metric(month)).await
    }

    async fn calls(&self, month: &str) -> Result<i64, sqlx::Error> {
        stats_queries::get_stat(&self.pool, &stats_queries::calls_metric(month)).await
    }

    async fn record_usage(&self, month: &str, tokens: i64) -> Result<i64, sqlx::Error> {
        stats_queries::add_usage(&self.pool, month, tokens).await
    }

    async fn reserve_tokens(
        &self,
        month: &str,
        tokens: i64,
        budget: &Budget,
    ) -> Result<Result<i64, BudgetExceeded>, sqlx::Error> {
        stats_queries::reserve_tokens(&self.pool, month, tokens, budget).await
    }

    async fn release_tokens(&self, month: &str, tokens: i64) -> Result<(), sqlx::Error> {
        stats_queries::release_tokens(&self.pool, month, tokens).await
    }

    async fn upsert_judgement(&self, judgement: &Judgement) -> Result<(), sqlx::Error> {
        judgement_queries::upsert_judgement(&self.pool, judgement).await
    }

    async fn judgement(&self, project: &str) -> Result<Option<Judgement>, sqlx::Error> {
        judgement_queries::get_judgement(&self.pool, project).await
    }
}
