use sqlx::PgPool;
use std::sync::Arc;

use crate::services::{
    budget::{Budget, Clock, SystemClock},
    ledger::PgLedger,
    queue::PgBatchQueue,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub queue: Arc<PgBatchQueue>,
    pub ledger: Arc<PgLedger>,
    pub clock: Arc<dyn Clock>,
    pub budget: Budget,
}

impl AppState {
    pub fn new(db: PgPool, budget: Budget) -> Self {
        Self {
            queue: Arc::new(PgBatchQueue::new(db.clone())),
            ledger: Arc::new(PgLedger::new(db.clone())),
            clock: Arc::new(SystemClock),
            db,
            budget,
        }
    }
}
