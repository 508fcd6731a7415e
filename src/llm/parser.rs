//! Parsing of SQL generation responses.
//!
//! The model is asked for a JSON object `{sql, explanation, confidence}`.
//! Models do not always comply, so a fenced code block (or bare JSON wrapped
//! in prose) is accepted too.

use crate::error::{GateError, Result};
use serde::Deserialize;

/// SQL proposed by the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSql {
    pub sql: String,
    pub explanation: String,
    /// Model confidence, clamped to [0, 1].
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
struct JsonAnswer {
    #[serde(default)]
    sql: String,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Parses a raw completion into a [`GeneratedSql`].
///
/// Tries, in order: the whole text as JSON, the first `{...}` span as JSON,
/// then a ```sql (or bare ```) code block with the surrounding prose as the
/// explanation. Fails if none of these yields a non-empty statement.
pub fn parse_generation(response: &str) -> Result<GeneratedSql> {
    let trimmed = response.trim();

    let answer = serde_json::from_str::<JsonAnswer>(trimmed)
        .ok()
        .or_else(|| embedded_json(trimmed));

    if let Some(answer) = answer {
        let sql = answer.sql.trim().to_string();
        if sql.is_empty() {
            return Err(GateError::llm("Model response did not contain SQL"));
        }
        return Ok(GeneratedSql {
            sql,
            explanation: answer.explanation.trim().to_string(),
            confidence: clamp_confidence(answer.confidence.unwrap_or(0.0)),
        });
    }

    let block = extract_code_block(trimmed, "sql").or_else(|| extract_code_block(trimmed, ""));
    match block {
        Some((sql, prose)) if !sql.trim().is_empty() => Ok(GeneratedSql {
            sql: sql.trim().to_string(),
            explanation: prose,
            confidence: 0.0,
        }),
        _ => Err(GateError::llm(format!(
            "Could not parse model response: {}",
            preview(trimmed)
        ))),
    }
}

/// Clamps a confidence to [0, 1]; NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn embedded_json(text: &str) -> Option<JsonAnswer> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Extracts the first fenced block tagged `lang` (empty for untagged).
/// Returns the block content and the text around it.
fn extract_code_block(text: &str, lang: &str) -> Option<(String, String)> {
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find("```") {
        let fence = search_from + offset;
        let after_fence = fence + 3;
        let line_end = text[after_fence..].find('\n').map(|i| after_fence + i)?;
        let tag = text[after_fence..line_end].trim();

        let content_start = line_end + 1;
        let close = text[content_start..].find("```").map(|i| content_start + i)?;

        if tag.eq_ignore_ascii_case(lang) {
            let content = text[content_start..close].to_string();
            let prose = format!("{} {}", text[..fence].trim(), text[close + 3..].trim());
            return Some((content, prose.trim().to_string()));
        }

        search_from = close + 3;
    }

    None
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
