//! Mock LLM client for tests and offline use.
//!
//! Returns canned generation answers chosen by substring match on the
//! last user message.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{GateError, Result};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Mock LLM client that returns canned responses based on input patterns.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response), checked first.
    custom_responses: Vec<(String, String)>,
    delay: Option<Duration>,
    failure: Option<String>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping.
    ///
    /// When the question contains `pattern` (case-insensitive), the mock
    /// returns `response` verbatim.
    pub fn with_response(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.custom_responses
            .push((pattern.into(), response.into()));
        self
    }

    /// Adds a mapping that answers with a JSON generation result.
    pub fn with_sql(self, pattern: impl Into<String>, sql: &str, confidence: f64) -> Self {
        let response = serde_json::json!({
            "sql": sql,
            "explanation": format!("Runs: {sql}"),
            "confidence": confidence,
        });
        self.with_response(pattern, response.to_string())
    }

    /// Sleeps before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fails every request with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    fn mock_response(&self, input: &str) -> String {
        let input_lower = input.to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if input_lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        let (sql, explanation) = if input_lower.contains("count") && input_lower.contains("orders")
        {
            ("SELECT COUNT(*) FROM orders", "Counts all orders")
        } else if (input_lower.contains("add") || input_lower.contains("insert"))
            && input_lower.contains("user")
        {
            (
                "INSERT INTO users (name, email) VALUES ('Test User', 'test@example.com')",
                "Adds a new user",
            )
        } else if input_lower.contains("update") && input_lower.contains("user") {
            (
                "UPDATE users SET name = 'Updated Name' WHERE id = 1",
                "Renames user 1",
            )
        } else if input_lower.contains("delete") && input_lower.contains("user") {
            ("DELETE FROM users WHERE id = 1", "Deletes user 1")
        } else if input_lower.contains("users") {
            ("SELECT * FROM users", "Lists all users")
        } else {
            return r#"{"sql": "", "explanation": "I don't understand that question.", "confidence": 0.0}"#
                .to_string();
        };

        serde_json::json!({"sql": sql, "explanation": explanation, "confidence": 0.9}).to_string()
    }

    /// The question is the tail of the last user message.
    fn extract_user_input(messages: &[Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| {
                m.content
                    .rsplit_once("User question:")
                    .map(|(_, question)| question.to_string())
                    .unwrap_or_else(|| m.content.clone())
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(GateError::llm(message.clone()));
        }
        let input = Self::extract_user_input(messages);
        Ok(self.mock_response(&input))
    }
}
