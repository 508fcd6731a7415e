//! OpenAI-compatible chat completions client.
//!
//! Works against any endpoint speaking the OpenAI chat completions
//! protocol. The default configuration targets Groq.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{GateError, Result};
use crate::llm::types::Message;
use crate::llm::LlmClient;

/// Maximum number of attempts for transient errors.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Client settings.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    /// Full chat completions URL.
    pub endpoint: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    /// Builds settings from the `[llm]` section; the API key must be set.
    pub fn from_llm_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            GateError::config("No API key configured. Set GROQ_API_KEY or llm.api_key.")
        })?;

        Ok(Self {
            api_key,
            model: config.model.clone(),
            endpoint: config.base_url.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }
}

/// Chat completions client with retry on rate limits, server errors and
/// connection failures.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GateError::llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn build_request(&self, messages: &[Message]) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
        }
    }

    /// Maps an API error response to (error, is_retryable).
    fn parse_error(status: StatusCode, body: &str) -> (GateError, bool) {
        if status == StatusCode::UNAUTHORIZED {
            return (
                GateError::llm("Authentication failed. Check your API key."),
                false,
            );
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return (GateError::llm("Rate limited. Please wait and try again."), true);
        }

        let is_retryable = status.is_server_error();

        if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(body) {
            return (
                GateError::llm(format!("API error: {}", error_response.error.message)),
                is_retryable,
            );
        }

        (
            GateError::llm(format!("API error ({}): {}", status, body)),
            is_retryable,
        )
    }

    fn request_error(e: &reqwest::Error) -> (GateError, bool) {
        if e.is_timeout() {
            (GateError::llm("Request timed out. Try again."), true)
        } else if e.is_connect() {
            (
                GateError::llm("Failed to connect to the model API. Check your network."),
                true,
            )
        } else {
            (GateError::llm(format!("Request failed: {}", e)), false)
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = self.build_request(messages);
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        loop {
            debug!(
                model = %self.config.model,
                "Chat completion attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS
            );

            let result = self
                .client
                .post(&self.config.endpoint)
                .bearer_auth(&self.config.api_key)
                .json(&request)
                .send()
                .await;

            let (error, is_retryable) = match result {
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .map_err(|e| GateError::llm(format!("Failed to read response: {}", e)))?;

                    if status.is_success() {
                        let response: ChatResponse = serde_json::from_str(&body).map_err(|e| {
                            GateError::llm(format!("Failed to parse response: {}", e))
                        })?;

                        return response
                            .choices
                            .into_iter()
                            .next()
                            .map(|c| c.message.content)
                            .ok_or_else(|| GateError::llm("Empty response from model"));
                    }

                    Self::parse_error(status, &body)
                }
                Err(e) => Self::request_error(&e),
            };

            if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
                return Err(error);
            }

            warn!(
                "Chat completion failed (attempt {}), retrying in {:?}: {}",
                attempt, delay, error
            );
            tokio::time::sleep(delay).await;
            delay *= 2;
            attempt += 1;
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
