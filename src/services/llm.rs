use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sampling parameters for one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Text returned by the model plus the tokens billed for the call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub total_tokens: Option<i64>,
}

/// External text-generation service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<Completion, GatewayError>;
}

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: i64,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<Completion, GatewayError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request_body = ChatRequest {
            model: &params.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        parse_chat_response(&body)
    }
}

/// Extract the first choice's text and the usage total from a response body.
pub fn parse_chat_response(body: &str) -> Result<Completion, GatewayError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| GatewayError::Malformed(e.to_string()))?;

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| GatewayError::Malformed("response contained no message content".to_string()))?;

    Ok(Completion {
        text: text.trim().to_string(),
        total_tokens: parsed.usage.map(|u| u.total_tokens),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Completion call timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed completion response: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// Transport and timeout-class failures are worth another attempt;
    /// rejected requests and unreadable responses are not.
    pub fn is_retriable(&self) -> bool {
        match self {
            GatewayError::Timeout(_) => true,
            GatewayError::Transport(e) => !e.is_builder() && !e.is_decode(),
            GatewayError::Status { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            GatewayError::Malformed(_) => false,
        }
    }
}
