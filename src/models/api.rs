use serde::Serialize;

use crate::models::verdict::VerdictRecord;

/// Response after submitting a batch of projects.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub batch_id: i64,
}

/// Response for querying batch status.
#[derive(Debug, Serialize)]
pub struct BatchStatusResponse {
    pub batch_id: i64,
    pub status: String,
    pub size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<VerdictRecord>>,
}

/// Latest stored verdict for a project.
#[derive(Debug, Serialize)]
pub struct JudgementResponse {
    pub project: String,
    pub verdict: String,
    pub text: String,
}

/// Token usage for the current month.
#[derive(Debug, Serialize)]
pub struct TokenStatsResponse {
    pub month: String,
    pub tokens_used: i64,
    pub calls: i64,
    pub budget_usd: f64,
    pub spent_usd: f64,
}
