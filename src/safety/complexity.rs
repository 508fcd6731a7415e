//! Heuristic complexity scoring.

use sqlparser::tokenizer::{Token, Word};

use super::Statement;

const BASE_SCORE: u32 = 10;
const SELECT_WEIGHT: u32 = 15;
const JOIN_WEIGHT: u32 = 10;
const UNION_WEIGHT: u32 = 10;
const AGGREGATE_WEIGHT: u32 = 5;
const WILDCARD_LIKE_WEIGHT: u32 = 5;

const AGGREGATES: [&str; 5] = ["COUNT", "SUM", "AVG", "MAX", "MIN"];

/// Scores a statement from structural keyword counts.
///
/// Every SELECT is counted, the outer one included, so the score grows with
/// overall statement size as well as nesting. The score has no upper bound
/// and never causes a rejection by itself.
pub fn complexity_score(statement: &Statement) -> u32 {
    let tokens = statement.tokens();
    let mut score = BASE_SCORE;

    for (i, token) in tokens.iter().enumerate() {
        let Some(word) = bare_word(token) else {
            continue;
        };
        let next = tokens.get(i + 1);

        score += if is(word, "SELECT") {
            SELECT_WEIGHT
        } else if is(word, "JOIN") {
            JOIN_WEIGHT
        } else if is(word, "UNION") {
            UNION_WEIGHT
        } else if AGGREGATES.iter().any(|agg| is(word, agg)) {
            AGGREGATE_WEIGHT
        } else if is(word, "GROUP") && next.and_then(bare_word).is_some_and(|w| is(w, "BY")) {
            AGGREGATE_WEIGHT
        } else if (is(word, "LIKE") || is(word, "ILIKE")) && is_wildcard_literal(next) {
            WILDCARD_LIKE_WEIGHT
        } else {
            0
        };
    }

    score
}

/// Returns the word if it is unquoted, so `"select"` as an identifier is ignored.
fn bare_word(token: &Token) -> Option<&Word> {
    match token {
        Token::Word(word) if word.quote_style.is_none() => Some(word),
        _ => None,
    }
}

fn is(word: &Word, keyword: &str) -> bool {
    word.value.eq_ignore_ascii_case(keyword)
}

fn is_wildcard_literal(token: Option<&Token>) -> bool {
    matches!(token, Some(Token::SingleQuotedString(s)) if s.starts_with('%'))
}
