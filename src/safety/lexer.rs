//! SQL tokenizing and statement classification.
//!
//! Uses the sqlparser-rs tokenizer with the PostgreSQL dialect. No AST is
//! built: the classifier only needs statement boundaries, the leading
//! keyword, a top-level WHERE and the tables named after FROM or JOIN.
//!
//! Table extraction is a heuristic. CTE bodies and subqueries in FROM are
//! not walked, so a name that only appears there is not reported. Only
//! FROM and JOIN are read: the target of `INSERT INTO` or `UPDATE` is not
//! reported unless it also appears after one of them.

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};
use thiserror::Error;

use super::OperationKind;

/// Reasons a SQL string cannot be classified as a single statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    /// The text could not be tokenized or contains no statement.
    #[error("{0}")]
    Parse(String),

    /// A terminator is followed by more tokens. Carries the leading kind.
    #[error("multiple statements, leading with {0}")]
    MultipleStatements(OperationKind),
}

/// A single SQL statement with its derived properties.
///
/// Derived fields are computed once in [`Statement::parse`] and never change.
#[derive(Debug, Clone)]
pub struct Statement {
    sql: String,
    tokens: Vec<Token>,
    kind: OperationKind,
    has_where_clause: bool,
    referenced_tables: Vec<String>,
}

impl Statement {
    /// Tokenizes and classifies a SQL string.
    pub fn parse(sql: &str) -> Result<Self, ClassifyError> {
        let dialect = PostgreSqlDialect {};
        let tokens = Tokenizer::new(&dialect, sql)
            .tokenize()
            .map_err(|e| ClassifyError::Parse(e.to_string()))?;

        let mut tokens: Vec<Token> = tokens.into_iter().filter(is_significant).collect();

        let kind = match tokens.first() {
            Some(first) => leading_kind(first),
            None => return Err(ClassifyError::Parse("no SQL statement found".to_string())),
        };

        if let Some(end) = tokens.iter().position(|t| matches!(t, Token::SemiColon)) {
            if tokens.len() > end + 1 {
                return Err(ClassifyError::MultipleStatements(kind));
            }
            tokens.truncate(end);
        }

        let depths = nesting_depths(&tokens);
        let has_where_clause = tokens
            .iter()
            .zip(&depths)
            .any(|(token, depth)| *depth == 0 && is_keyword(token, Keyword::WHERE));
        let referenced_tables = collect_tables(&tokens, &depths);

        Ok(Self {
            sql: sql.to_string(),
            tokens,
            kind,
            has_where_clause,
            referenced_tables,
        })
    }

    /// Returns the raw SQL text as received.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Returns the operation kind from the leading keyword.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Returns true if the statement has a WHERE clause outside any parentheses.
    pub fn has_where_clause(&self) -> bool {
        self.has_where_clause
    }

    /// Returns tables named after top-level FROM and JOIN, in order of appearance.
    pub fn referenced_tables(&self) -> &[String] {
        &self.referenced_tables
    }

    /// Returns the statement's tokens without whitespace, comments or terminator.
    pub(crate) fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

fn is_significant(token: &Token) -> bool {
    !matches!(token, Token::Whitespace(_) | Token::EOF)
}

fn is_keyword(token: &Token, keyword: Keyword) -> bool {
    matches!(token, Token::Word(w) if w.keyword == keyword)
}

/// Maps the first significant token to an operation kind.
fn leading_kind(token: &Token) -> OperationKind {
    let Token::Word(word) = token else {
        return OperationKind::Unknown;
    };
    match word.keyword {
        Keyword::SELECT => OperationKind::Select,
        Keyword::INSERT => OperationKind::Insert,
        Keyword::UPDATE => OperationKind::Update,
        Keyword::DELETE => OperationKind::Delete,
        Keyword::CREATE => OperationKind::Create,
        Keyword::DROP => OperationKind::Drop,
        Keyword::ALTER => OperationKind::Alter,
        Keyword::TRUNCATE => OperationKind::Truncate,
        _ => OperationKind::Unknown,
    }
}

/// Returns the parenthesis depth each token sits at. A paren counts at its outer depth.
fn nesting_depths(tokens: &[Token]) -> Vec<usize> {
    let mut depth = 0usize;
    tokens
        .iter()
        .map(|token| match token {
            Token::LParen => {
                depth += 1;
                depth - 1
            }
            Token::RParen => {
                depth = depth.saturating_sub(1);
                depth
            }
            _ => depth,
        })
        .collect()
}

fn collect_tables(tokens: &[Token], depths: &[usize]) -> Vec<String> {
    let mut tables = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        if depths[i] == 0 {
            if is_keyword(&tokens[i], Keyword::FROM) {
                i = read_table_refs(tokens, i + 1, true, &mut tables);
                continue;
            }
            if is_keyword(&tokens[i], Keyword::JOIN) {
                i = read_table_refs(tokens, i + 1, false, &mut tables);
                continue;
            }
        }
        i += 1;
    }

    tables
}

/// Reads one table reference (or a comma-separated list when `list` is set)
/// starting at `i`. Returns the index of the first token not consumed.
fn read_table_refs(tokens: &[Token], mut i: usize, list: bool, tables: &mut Vec<String>) -> usize {
    loop {
        match tokens.get(i) {
            Some(Token::Word(_)) => {
                let (name, next) = read_qualified_name(tokens, i);
                i = next;
                if matches!(tokens.get(i), Some(Token::LParen)) {
                    // Table function such as generate_series(...), not a table.
                    i = skip_group(tokens, i);
                } else if !tables.contains(&name) {
                    tables.push(name);
                }
            }
            Some(Token::LParen) => i = skip_group(tokens, i),
            _ => return i,
        }

        i = skip_alias(tokens, i);

        if list && matches!(tokens.get(i), Some(Token::Comma)) {
            i += 1;
            continue;
        }
        return i;
    }
}

/// Reads `name` or `schema.name` as written, without quote characters.
fn read_qualified_name(tokens: &[Token], start: usize) -> (String, usize) {
    let mut parts = Vec::new();
    let mut i = start;

    while let Some(Token::Word(word)) = tokens.get(i) {
        parts.push(word.value.as_str());
        i += 1;
        match (tokens.get(i), tokens.get(i + 1)) {
            (Some(Token::Period), Some(Token::Word(_))) => i += 1,
            _ => break,
        }
    }

    (parts.join("."), i)
}

/// Skips a balanced parenthesized group starting at `start`.
fn skip_group(tokens: &[Token], start: usize) -> usize {
    let mut depth = 0usize;
    for (offset, token) in tokens[start..].iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return start + offset + 1;
                }
            }
            _ => {}
        }
    }
    tokens.len()
}

/// Keywords that end a table reference instead of naming its alias.
const CLAUSE_KEYWORDS: &[Keyword] = &[
    Keyword::WHERE,
    Keyword::JOIN,
    Keyword::INNER,
    Keyword::LEFT,
    Keyword::RIGHT,
    Keyword::FULL,
    Keyword::CROSS,
    Keyword::NATURAL,
    Keyword::ON,
    Keyword::USING,
    Keyword::GROUP,
    Keyword::ORDER,
    Keyword::LIMIT,
    Keyword::OFFSET,
    Keyword::HAVING,
    Keyword::WINDOW,
    Keyword::UNION,
    Keyword::INTERSECT,
    Keyword::EXCEPT,
    Keyword::FETCH,
    Keyword::FOR,
    Keyword::RETURNING,
    Keyword::SET,
];

/// Skips `AS alias` or a bare alias. Any word that does not open a clause is
/// an alias, so keyword-named aliases like `data` or `id` are skipped too.
fn skip_alias(tokens: &[Token], i: usize) -> usize {
    match tokens.get(i) {
        Some(Token::Word(w)) if w.keyword == Keyword::AS => match tokens.get(i + 1) {
            Some(Token::Word(_)) => i + 2,
            _ => i + 1,
        },
        Some(Token::Word(w)) if !CLAUSE_KEYWORDS.contains(&w.keyword) => i + 1,
        _ => i,
    }
}
