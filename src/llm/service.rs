//! Natural language to SQL generation.
//!
//! `SqlGenerator` is the single entry point the gate uses to turn a question
//! into a candidate statement: it builds the prompt, calls the model and
//! parses the answer. All processing is logged via tracing.

use std::sync::Arc;
use std::time::Instant;

use crate::context::ContextDoc;
use crate::db::Schema;
use crate::error::Result;

use super::{build_messages, parse_generation, GeneratedSql, LlmClient};

/// Wraps an [`LlmClient`] with prompt building and response parsing.
#[derive(Clone)]
pub struct SqlGenerator {
    client: Arc<dyn LlmClient>,
    log_queries: bool,
}

impl SqlGenerator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            log_queries: true,
        }
    }

    /// Controls whether questions and generated SQL appear in logs.
    pub fn with_query_logging(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    /// Generates one candidate statement for `question`.
    pub async fn generate(
        &self,
        question: &str,
        schema: &Schema,
        context: &[ContextDoc],
    ) -> Result<GeneratedSql> {
        let start = Instant::now();
        if self.log_queries {
            tracing::info!(question, "Generating SQL");
        } else {
            tracing::debug!(input_len = question.len(), "Generating SQL");
        }

        let messages = build_messages(question, schema, context);
        tracing::debug!(
            message_count = messages.len(),
            table_count = schema.tables.len(),
            context_docs = context.len(),
            "Sending request to LLM"
        );

        let raw = self.client.complete(&messages).await?;
        let generated = parse_generation(&raw)?;

        if self.log_queries {
            tracing::info!(
                duration_ms = start.elapsed().as_millis(),
                sql = %generated.sql,
                confidence = generated.confidence,
                "Generated SQL"
            );
        } else {
            tracing::info!(
                duration_ms = start.elapsed().as_millis(),
                sql_len = generated.sql.len(),
                confidence = generated.confidence,
                "Generated SQL"
            );
        }

        Ok(generated)
    }

    /// Returns a reference to the underlying LLM client.
    pub fn client(&self) -> &dyn LlmClient {
        self.client.as_ref()
    }
}

impl std::fmt::Debug for SqlGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlGenerator")
            .field("log_queries", &self.log_queries)
            .finish_non_exhaustive()
    }
}
