//! SQL generation through a chat-completion model.
//!
//! The gate only needs one thing from a model: turn a question plus schema
//! into a candidate statement. [`LlmClient`] is the transport seam and
//! [`SqlGenerator`] wraps it with prompt building and response parsing.

pub mod factory;
pub mod mock;
pub mod openai;
pub mod parser;
pub mod prompt;
pub mod service;
pub mod types;

pub use factory::create_client;
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, OpenAiConfig};
pub use parser::{clamp_confidence, parse_generation, GeneratedSql};
pub use prompt::{build_messages, build_system_prompt};
pub use service::SqlGenerator;
pub use types::{Message, Role};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Result;

/// Trait for LLM clients that can generate completions.
///
/// Implementations must be thread-safe (Send + Sync) to support async operations.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generates a completion for the given messages.
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Any OpenAI-compatible chat completions endpoint (Groq by default).
    #[default]
    OpenAi,
    /// Canned responses, no API key required.
    Mock,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Mock => "mock",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "groq" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
