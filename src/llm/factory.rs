//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use crate::config::LlmConfig;
use crate::error::Result;
use crate::llm::{LlmClient, LlmProvider, MockLlmClient, OpenAiClient, OpenAiConfig};

/// Creates an LLM client for the configured provider.
///
/// The API key comes from `llm.api_key`, which the config loader fills from
/// `GROQ_API_KEY` or `LLM_API_KEY` when set.
pub fn create_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider {
        LlmProvider::OpenAi => {
            let settings = OpenAiConfig::from_llm_config(config)?;
            Ok(Box::new(OpenAiClient::new(settings)?))
        }
        LlmProvider::Mock => Ok(Box::new(MockLlmClient::new())),
    }
}
