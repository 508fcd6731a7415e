//! Prompt construction for SQL generation.

use crate::context::ContextDoc;
use crate::db::Schema;
use crate::llm::types::Message;

const SYSTEM_PROMPT: &str = r#"You are an expert SQL assistant that converts natural language to PostgreSQL.

Pick the statement type from the user's intent:
- "add", "create", "insert", "new" -> INSERT
- "update", "change", "modify", "set" -> UPDATE
- "delete", "remove" -> DELETE
- "show", "list", "get", "find", "count" -> SELECT

Rules:
- Use only tables and columns from the provided schema, spelled exactly as given
- Generate exactly one statement
- Always include a WHERE clause for UPDATE and DELETE when specific records are mentioned
- Never use comments in the SQL

Respond with a JSON object only:
{"sql": "...", "explanation": "one line describing the statement", "confidence": 0.0-1.0}"#;

/// Builds the system prompt.
pub fn build_system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// Builds the user prompt with the schema, optional context and the question.
pub fn build_user_prompt(question: &str, schema: &Schema, context: &[ContextDoc]) -> String {
    let mut prompt = schema.format_for_llm();

    if !context.is_empty() {
        prompt.push_str("Relevant context:\n");
        for (i, doc) in context.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, doc.content.trim()));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("User question: \"{}\"", question.trim()));
    prompt
}

/// Builds the message list for one generation request.
pub fn build_messages(question: &str, schema: &Schema, context: &[ContextDoc]) -> Vec<Message> {
    vec![
        Message::system(build_system_prompt()),
        Message::user(build_user_prompt(question, schema, context)),
    ]
}
