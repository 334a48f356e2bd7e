use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::retry::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Upper bound on pooled PostgreSQL connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// API key for the chat-completions service
    pub openai_api_key: String,

    /// Chat-completions base URL (OpenAI-compatible)
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Response size cap sent to the model, also charged in the budget estimate
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Project descriptions are cut to this many characters before prompting
    #[serde(default = "default_max_description_len")]
    pub max_description_len: usize,

    /// Hard timeout for a single completion call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Total attempts per completion call, including the first one
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: u32,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Monthly spend ceiling in USD
    #[serde(default = "default_monthly_budget_usd")]
    pub monthly_budget_usd: f64,

    #[serde(default = "default_cost_per_1k_tokens")]
    pub cost_per_1k_tokens: f64,

    /// Worker sleep between empty claims
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// When set, batches stuck in `process` longer than this are returned to `new`.
    /// Unset means stuck batches wait for an operator.
    pub reclaim_after_secs: Option<u64>,

    /// Overrides the built-in prompt template
    pub prompt_template_path: Option<PathBuf>,

    /// JSON file with known scam projects
    pub scamlist_path: Option<PathBuf>,

    /// Worker-only Prometheus listener (e.g., "0.0.0.0:9100"). Unset disables it.
    pub worker_metrics_addr: Option<SocketAddr>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_output_tokens() -> u32 {
    300
}

fn default_max_description_len() -> usize {
    512
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    2000
}

fn default_retry_multiplier() -> u32 {
    2
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_monthly_budget_usd() -> f64 {
    20.0
}

fn default_cost_per_1k_tokens() -> f64 {
    0.002
}

fn default_poll_interval_ms() -> u64 {
    60_000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            multiplier: self.retry_multiplier.max(1),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reclaim_after(&self) -> Option<Duration> {
        self.reclaim_after_secs.map(Duration::from_secs)
    }
}
