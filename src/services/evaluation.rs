//! Evaluation gateway: one project in, one verdict record out.
//!
//! ```text
//! evaluate(project)
//!   ├─ render prompt (description truncated, scam-list matches embedded)
//!   ├─ reserve estimate: month usage + estimate > ceiling → error verdict, no call
//!   ├─ completion call under timeout, retried with backoff on transient errors
//!   ├─ settle usage (reservation released if the call failed)
//!   ├─ parse {"verdict", "explanation"} → error verdict if unrecognised
//!   └─ upsert judgement (every outcome, including errors)
//! ```

use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::models::batch::ProjectRequest;
use crate::models::verdict::{Judgement, Verdict, VerdictRecord};
use crate::services::budget::{estimate_tokens, month_key, Budget, BudgetExceeded, Clock};
use crate::services::ledger::EvaluationLedger;
use crate::services::llm::{Completion, CompletionClient, CompletionParams, GatewayError};
use crate::services::prompt::{PromptBuilder, PromptError};
use crate::services::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct EvaluationSettings {
    pub params: CompletionParams,
    pub retry: RetryPolicy,
    pub budget: Budget,
    pub request_timeout: Duration,
}

impl EvaluationSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            params: CompletionParams {
                model: config.openai_model.clone(),
                temperature: config.temperature,
                max_tokens: config.max_output_tokens,
            },
            retry: config.retry_policy(),
            budget: Budget::new(config.monthly_budget_usd, config.cost_per_1k_tokens),
            request_timeout: config.request_timeout(),
        }
    }
}

pub struct EvaluationGateway {
    client: Arc<dyn CompletionClient>,
    ledger: Arc<dyn EvaluationLedger>,
    clock: Arc<dyn Clock>,
    prompts: PromptBuilder,
    settings: EvaluationSettings,
}

/// Why a single project ended with an `error` verdict.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error(transparent)]
    BudgetExceeded(#[from] BudgetExceeded),

    #[error("{0}")]
    Gateway(#[from] GatewayError),

    #[error("Unparseable verdict: {0}")]
    Parse(String),

    #[error("Usage ledger unavailable: {0}")]
    Ledger(#[from] sqlx::Error),

    #[error("Prompt rendering failed: {0}")]
    Prompt(#[from] PromptError),
}

#[derive(Deserialize)]
struct RawVerdict {
    verdict: String,
    #[serde(default)]
    explanation: String,
}

impl EvaluationGateway {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        ledger: Arc<dyn EvaluationLedger>,
        clock: Arc<dyn Clock>,
        prompts: PromptBuilder,
        settings: EvaluationSettings,
    ) -> Self {
        Self {
            client,
            ledger,
            clock,
            prompts,
            settings,
        }
    }

    /// Evaluate one project. Never fails: every problem becomes an `error` verdict.
    pub async fn evaluate(&self, project: &ProjectRequest) -> VerdictRecord {
        let record = match self.request_completion(project).await {
            Ok(completion) => match parse_verdict(&completion.text) {
                Ok((verdict, explanation)) => {
                    tracing::info!(
                        project = %project.name,
                        verdict = %verdict,
                        tokens = completion.total_tokens,
                        "Project evaluated"
                    );
                    VerdictRecord {
                        name: project.name.clone(),
                        verdict,
                        explanation,
                        tokens: completion.total_tokens,
                    }
                }
                Err(e) => error_record(project, e, completion.total_tokens),
            },
            Err(e) => error_record(project, e, None),
        };

        metrics::counter!("evaluations_total", "verdict" => record.verdict.as_str()).increment(1);

        if let Err(e) = self.ledger.upsert_judgement(&Judgement::from(&record)).await {
            tracing::warn!(project = %record.name, error = %e, "Failed to store judgement");
        }

        record
    }

    /// Render, reserve budget, call the model and settle usage.
    async fn request_completion(&self, project: &ProjectRequest) -> Result<Completion, EvaluationError> {
        let prompt = self.prompts.render(project)?;

        let month = month_key(self.clock.now());
        let estimated = estimate_tokens(&prompt) + i64::from(self.settings.params.max_tokens);
        if let Err(exceeded) = self
            .ledger
            .reserve_tokens(&month, estimated, &self.settings.budget)
            .await?
        {
            metrics::counter!("budget_rejections_total").increment(1);
            return Err(exceeded.into());
        }

        let completion = match self.call_with_retry(&prompt).await {
            Ok(completion) => completion,
            Err(e) => {
                if let Err(release) = self.ledger.release_tokens(&month, estimated).await {
                    tracing::error!(
                        month = %month,
                        tokens = estimated,
                        error = %release,
                        "Failed to release token reservation"
                    );
                }
                return Err(e.into());
            }
        };

        // Unattributed calls are charged at the estimate
        let charged = completion.total_tokens.unwrap_or(estimated);
        match self.ledger.record_usage(&month, charged - estimated).await {
            Ok(total) => {
                metrics::counter!("evaluation_tokens_total").increment(charged.max(0) as u64);
                tracing::debug!(month = %month, tokens = charged, month_total = total, "Usage recorded");
            }
            Err(e) => {
                tracing::error!(month = %month, tokens = charged, error = %e, "Failed to settle token usage");
            }
        }

        Ok(completion)
    }

    async fn call_with_retry(&self, prompt: &str) -> Result<Completion, GatewayError> {
        let timeout = self.settings.request_timeout;
        let params = &self.settings.params;

        self.settings
            .retry
            .run(
                |attempt| async move {
                    tracing::debug!(attempt, model = %params.model, "Calling completion service");
                    match tokio::time::timeout(timeout, self.client.complete(prompt, params)).await {
                        Ok(result) => result,
                        Err(_) => Err(GatewayError::Timeout(timeout)),
                    }
                },
                GatewayError::is_retriable,
            )
            .await
    }
}

fn error_record(project: &ProjectRequest, error: EvaluationError, tokens: Option<i64>) -> VerdictRecord {
    tracing::warn!(project = %project.name, error = %error, "Project evaluation failed");
    VerdictRecord {
        name: project.name.clone(),
        verdict: Verdict::Error,
        explanation: format!("Evaluation error: {error}"),
        tokens,
    }
}

/// Parse the model's reply into a verdict and explanation.
///
/// The reply must be a JSON object, optionally wrapped in a Markdown code fence.
pub fn parse_verdict(text: &str) -> Result<(Verdict, String), EvaluationError> {
    let body = strip_code_fence(text);
    let raw: RawVerdict =
        serde_json::from_str(body).map_err(|e| EvaluationError::Parse(format!("invalid JSON reply: {e}")))?;

    let verdict = Verdict::from_str(raw.verdict.trim())
        .map_err(|_| EvaluationError::Parse(format!("unexpected verdict '{}'", raw.verdict)))?;

    Ok((verdict, raw.explanation.trim().to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line, e.g. ```json
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let (verdict, explanation) =
            parse_verdict(r#"{"verdict": "green", "explanation": " Public team, audited "}"#).unwrap();
        assert_eq!(verdict, Verdict::Green);
        assert_eq!(explanation, "Public team, audited");
    }

    #[test]
    fn test_parse_fenced_json_and_uppercase() {
        let reply = "```json\n{\"verdict\": \"RED\", \"explanation\": \"anonymous team\"}\n```";
        let (verdict, explanation) = parse_verdict(reply).unwrap();
        assert_eq!(verdict, Verdict::Red);
        assert_eq!(explanation, "anonymous team");
    }

    #[test]
    fn test_parse_missing_explanation_defaults_empty() {
        let (verdict, explanation) = parse_verdict(r#"{"verdict": "yellow"}"#).unwrap();
        assert_eq!(verdict, Verdict::Yellow);
        assert!(explanation.is_empty());
    }

    #[test]
    fn test_parse_unknown_verdict_rejected() {
        let err = parse_verdict(r#"{"verdict": "purple", "explanation": "?"}"#).unwrap_err();
        assert!(matches!(err, EvaluationError::Parse(ref m) if m.contains("purple")));
    }

    #[test]
    fn test_parse_prose_rejected() {
        let err = parse_verdict("I think this project looks fine.").unwrap_err();
        assert!(matches!(err, EvaluationError::Parse(_)));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}```"), "{\"a\":1}");
    }
}
