//! Test doubles for the queue store, usage ledger, completion service and
//! clock, plus HTTP helpers for the end-to-end suite.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use airdrop_screen::models::batch::{
    validate_payload, BatchStatus, BatchSummary, ClaimedBatch, ProjectRequest,
};
use airdrop_screen::models::verdict::{Judgement, VerdictRecord};
use airdrop_screen::services::budget::{Budget, BudgetExceeded, Clock};
use airdrop_screen::services::evaluation::{EvaluationGateway, EvaluationSettings};
use airdrop_screen::services::ledger::EvaluationLedger;
use airdrop_screen::services::llm::{Completion, CompletionClient, CompletionParams, GatewayError};
use airdrop_screen::services::prompt::PromptBuilder;
use airdrop_screen::services::queue::{BatchQueue, QueueError};
use airdrop_screen::services::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Queue store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoredBatch {
    pub status: BatchStatus,
    pub payload: Vec<ProjectRequest>,
    pub result: Option<Vec<VerdictRecord>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
}

/// In-memory queue with the same transition rules as the Postgres store.
#[derive(Default)]
pub struct MemoryQueue {
    rows: Mutex<BTreeMap<i64, StoredBatch>>,
    journal: Mutex<Vec<(String, String)>>,
    next_id: Mutex<i64>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch(&self, batch_id: i64) -> Option<StoredBatch> {
        self.rows.lock().unwrap().get(&batch_id).cloned()
    }

    pub fn journal(&self) -> Vec<(String, String)> {
        self.journal.lock().unwrap().clone()
    }
}

fn holds_claim(row: &StoredBatch, claim: &ClaimedBatch) -> bool {
    row.status == BatchStatus::Process && row.claimed_at == Some(claim.claimed_at)
}

#[async_trait]
impl BatchQueue for MemoryQueue {
    async fn enqueue(&self, payload: &[ProjectRequest]) -> Result<i64, QueueError> {
        validate_payload(payload).map_err(QueueError::Validation)?;

        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let id = *next_id;

        self.rows.lock().unwrap().insert(
            id,
            StoredBatch {
                status: BatchStatus::New,
                payload: payload.to_vec(),
                result: None,
                error: None,
                created_at: Utc::now(),
                claimed_at: None,
            },
        );
        Ok(id)
    }

    async fn claim_next(&self) -> Result<Option<ClaimedBatch>, QueueError> {
        let mut rows = self.rows.lock().unwrap();
        let claimed = rows
            .iter_mut()
            .find(|(_, row)| row.status == BatchStatus::New)
            .map(|(id, row)| {
                let claimed_at = Utc::now();
                row.status = BatchStatus::Process;
                row.claimed_at = Some(claimed_at);
                ClaimedBatch {
                    id: *id,
                    claimed_at,
                    payload: row.payload.clone(),
                }
            });
        Ok(claimed)
    }

    async fn complete(&self, claim: &ClaimedBatch, outcome: &[VerdictRecord]) -> Result<(), QueueError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&claim.id) {
            Some(row) if holds_claim(row, claim) => {
                row.status = BatchStatus::Done;
                row.result = Some(outcome.to_vec());
                Ok(())
            }
            _ => Err(QueueError::NotFound { id: claim.id }),
        }
    }

    async fn fail(&self, claim: &ClaimedBatch, diagnostic: &str) -> Result<(), QueueError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&claim.id) {
            Some(row) if holds_claim(row, claim) => {
                row.status = BatchStatus::Error;
                row.error = Some(diagnostic.to_string());
                Ok(())
            }
            _ => Err(QueueError::NotFound { id: claim.id }),
        }
    }

    async fn status_of(&self, batch_id: i64) -> Result<Option<BatchSummary>, QueueError> {
        Ok(self.batch(batch_id).map(|row| BatchSummary {
            id: batch_id,
            status: row.status,
            size: row.payload.len() as i64,
            created_at: row.created_at,
            error: row.error,
            result: row.result,
        }))
    }

    async fn reclaim_stale(&self, older_than: Duration) -> Result<Vec<i64>, QueueError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap();
        let mut rows = self.rows.lock().unwrap();
        let mut reclaimed = Vec::new();
        for (id, row) in rows.iter_mut() {
            if row.status == BatchStatus::Process && row.claimed_at.is_some_and(|at| at <= cutoff) {
                row.status = BatchStatus::New;
                row.claimed_at = None;
                reclaimed.push(*id);
            }
        }
        Ok(reclaimed)
    }

    async fn record_error(&self, scope: &str, message: &str) {
        self.journal
            .lock()
            .unwrap()
            .push((scope.to_string(), message.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryLedger {
    tokens: Mutex<HashMap<String, i64>>,
    calls: Mutex<HashMap<String, i64>>,
    judgements: Mutex<HashMap<String, Judgement>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a month's token counter.
    pub fn with_tokens(self, month: &str, tokens: i64) -> Self {
        self.tokens.lock().unwrap().insert(month.to_string(), tokens);
        self
    }

    pub fn tokens_for(&self, month: &str) -> i64 {
        self.tokens.lock().unwrap().get(month).copied().unwrap_or(0)
    }

    pub fn calls_for(&self, month: &str) -> i64 {
        self.calls.lock().unwrap().get(month).copied().unwrap_or(0)
    }

    pub fn judgement_of(&self, project: &str) -> Option<Judgement> {
        self.judgements.lock().unwrap().get(project).cloned()
    }
}

#[async_trait]
impl EvaluationLedger for MemoryLedger {
    async fn tokens_used(&self, month: &str) -> Result<i64, sqlx::Error> {
        Ok(self.tokens_for(month))
    }

    async fn calls(&self, month: &str) -> Result<i64, sqlx::Error> {
        Ok(self.calls_for(month))
    }

    async fn record_usage(&self, month: &str, tokens: i64) -> Result<i64, sqlx::Error> {
        *self.calls.lock().unwrap().entry(month.to_string()).or_insert(0) += 1;
        let mut all = self.tokens.lock().unwrap();
        let total = all.entry(month.to_string()).or_insert(0);
        *total += tokens;
        Ok(*total)
    }

    async fn reserve_tokens(
        &self,
        month: &str,
        tokens: i64,
        budget: &Budget,
    ) -> Result<Result<i64, BudgetExceeded>, sqlx::Error> {
        let mut all = self.tokens.lock().unwrap();
        let total = all.entry(month.to_string()).or_insert(0);
        if let Err(exceeded) = budget.check(*total, tokens) {
            return Ok(Err(exceeded));
        }
        *total += tokens;
        Ok(Ok(*total))
    }

    async fn release_tokens(&self, month: &str, tokens: i64) -> Result<(), sqlx::Error> {
        *self.tokens.lock().unwrap().entry(month.to_string()).or_insert(0) -= tokens;
        Ok(())
    }

    async fn upsert_judgement(&self, judgement: &Judgement) -> Result<(), sqlx::Error> {
        self.judgements
            .lock()
            .unwrap()
            .insert(judgement.project.clone(), judgement.clone());
        Ok(())
    }

    async fn judgement(&self, project: &str) -> Result<Option<Judgement>, sqlx::Error> {
        Ok(self.judgement_of(project))
    }
}

// ---------------------------------------------------------------------------
// Completion service
// ---------------------------------------------------------------------------

pub enum Reply {
    Text { text: String, tokens: Option<i64> },
    Fail(GatewayError),
    Panic(&'static str),
    /// Wait before producing the inner reply.
    After(Duration, Box<Reply>),
}

impl Reply {
    pub fn verdict(verdict: &str, explanation: &str) -> Self {
        Reply::Text {
            text: serde_json::json!({ "verdict": verdict, "explanation": explanation }).to_string(),
            tokens: Some(120),
        }
    }

    pub fn raw(text: &str, tokens: Option<i64>) -> Self {
        Reply::Text {
            text: text.to_string(),
            tokens,
        }
    }

    pub fn status(status: u16) -> Self {
        Reply::Fail(GatewayError::Status {
            status,
            body: "upstream says no".to_string(),
        })
    }

    pub fn after(self, delay: Duration) -> Self {
        Reply::After(delay, Box::new(self))
    }
}

/// Completion client that plays back a fixed script, one reply per call.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new(script: Vec<Reply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, prompt: &str, _params: &CompletionParams) -> Result<Completion, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());
        self.prompts.lock().unwrap().push(prompt.to_string());

        let next = self.script.lock().unwrap().pop_front();
        let mut reply = next.unwrap_or_else(|| {
            Reply::Fail(GatewayError::Malformed("script exhausted".to_string()))
        });

        loop {
            match reply {
                Reply::After(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                Reply::Text { text, tokens } => {
                    return Ok(Completion {
                        text,
                        total_tokens: tokens,
                    })
                }
                Reply::Fail(e) => return Err(e),
                Reply::Panic(message) => panic!("{message}"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Clock and gateway wiring
// ---------------------------------------------------------------------------

pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Self {
        Self(Mutex::new(
            Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap(),
        ))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock().unwrap() = at;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Settings with short backoff so paused-time tests stay readable.
pub fn test_settings() -> EvaluationSettings {
    EvaluationSettings {
        params: CompletionParams {
            model: "test-model".to_string(),
            temperature: 0.0,
            max_tokens: 300,
        },
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            multiplier: 2,
            max_delay: Duration::from_secs(5),
        },
        budget: Budget::new(20.0, 0.002),
        request_timeout: Duration::from_secs(30),
    }
}

pub struct Harness {
    pub client: Arc<ScriptedClient>,
    pub ledger: Arc<MemoryLedger>,
    pub clock: Arc<FixedClock>,
    pub gateway: Arc<EvaluationGateway>,
}

pub fn harness(script: Vec<Reply>) -> Harness {
    harness_with(script, MemoryLedger::new(), FixedClock::at(2026, 10, 16, 12, 0), test_settings())
}

pub fn harness_with(
    script: Vec<Reply>,
    ledger: MemoryLedger,
    clock: FixedClock,
    settings: EvaluationSettings,
) -> Harness {
    let client = Arc::new(ScriptedClient::new(script));
    let ledger = Arc::new(ledger);
    let clock = Arc::new(clock);
    let gateway = Arc::new(EvaluationGateway::new(
        client.clone(),
        ledger.clone(),
        clock.clone(),
        PromptBuilder::with_defaults(512),
        settings,
    ));

    Harness {
        client,
        ledger,
        clock,
        gateway,
    }
}

// ---------------------------------------------------------------------------
// HTTP (end-to-end suite)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub batch_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct BatchStatusResponse {
    pub batch_id: i64,
    pub status: String,
    pub size: i64,
    pub error: Option<String>,
    pub result: Option<Vec<VerdictRecord>>,
}

/// Submit a batch to POST /batch/submit.
pub async fn submit_batch(
    client: &reqwest::Client,
    base_url: &str,
    projects: &[ProjectRequest],
) -> Result<SubmitResponse, Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/batch/submit", base_url))
        .json(projects)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(format!("Submit failed with status {}: {}", status, error_text).into());
    }

    Ok(response.json::<SubmitResponse>().await?)
}

/// Poll batch status until it reaches `done` or `error` (with timeout).
pub async fn poll_batch_status(
    client: &reqwest::Client,
    base_url: &str,
    batch_id: i64,
    timeout_secs: u64,
) -> Result<BatchStatusResponse, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 2; // Poll every 500ms

    for _ in 0..max_attempts {
        let response = client
            .get(format!("{}/batch/{}", base_url, batch_id))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Status check failed: {}", error_text).into());
        }

        let status_response = response.json::<BatchStatusResponse>().await?;

        match status_response.status.as_str() {
            "done" | "error" => return Ok(status_response),
            "new" | "process" => tokio::time::sleep(Duration::from_millis(500)).await,
            other => return Err(format!("Unknown batch status: {}", other).into()),
        }
    }

    Err(format!("Batch did not finish within {} seconds", timeout_secs).into())
}
