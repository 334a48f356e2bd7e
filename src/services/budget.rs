//! Monthly spend ceiling for completion calls.
//!
//! Usage is bucketed by UTC calendar month (`YYYY-MM`). A new month starts
//! from zero simply because its counter key has never been written.

use chrono::{DateTime, Utc};

/// Wall-clock source, injectable so month rollover can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Month bucket for a timestamp, e.g. `2026-10`.
pub fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// Rough token count for outbound text: one token per four characters.
pub fn estimate_tokens(text: &str) -> i64 {
    let chars = text.chars().count() as i64;
    ((chars + 3) / 4).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Budget {
    pub monthly_usd: f64,
    pub cost_per_1k_tokens: f64,
}

impl Budget {
    pub fn new(monthly_usd: f64, cost_per_1k_tokens: f64) -> Self {
        Self {
            monthly_usd,
            cost_per_1k_tokens,
        }
    }

    pub fn cost_usd(&self, tokens: i64) -> f64 {
        tokens as f64 / 1000.0 * self.cost_per_1k_tokens
    }

    /// Refuse a call whose projected month total would exceed the ceiling.
    ///
    /// Pure arithmetic; callers that share a counter must read `used_tokens`
    /// and add `estimated_tokens` under one lock (see
    /// `EvaluationLedger::reserve_tokens`).
    pub fn check(&self, used_tokens: i64, estimated_tokens: i64) -> Result<(), BudgetExceeded> {
        let projected_usd = self.cost_usd(used_tokens.saturating_add(estimated_tokens));
        if projected_usd > self.monthly_usd {
            return Err(BudgetExceeded {
                projected_usd,
                ceiling_usd: self.monthly_usd,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("monthly budget exceeded: projected ${projected_usd:.4} over ceiling ${ceiling_usd:.2}")]
pub struct BudgetExceeded {
    pub projected_usd: f64,
    pub ceiling_usd: f64,
}
