//! Query safety classification module.
//!
//! Tokenizes machine-generated SQL, scans it for dangerous constructs,
//! scores its complexity and composes all of that into a verdict that
//! decides whether the statement may run, must be confirmed first, or is
//! rejected outright.

mod complexity;
mod lexer;
mod patterns;
mod policy;

pub use complexity::complexity_score;
pub use lexer::{ClassifyError, Statement};
pub use patterns::{scan, DangerousPattern};
pub use policy::SafetyPolicy;

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// The kind of operation a statement performs, taken from its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    Truncate,
    /// Leading token is not one of the recognized keywords.
    #[default]
    Unknown,
}

impl OperationKind {
    /// Returns true for every kind that can mutate or remove stored data or schema.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Self::Insert
                | Self::Update
                | Self::Delete
                | Self::Create
                | Self::Drop
                | Self::Alter
                | Self::Truncate
        )
    }

    /// Returns true if the operation touches rows selected by a WHERE clause.
    pub fn filters_rows(&self) -> bool {
        matches!(self, Self::Update | Self::Delete)
    }

    /// Returns the keyword as it appears in SQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Create => "CREATE",
            Self::Drop => "DROP",
            Self::Alter => "ALTER",
            Self::Truncate => "TRUNCATE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parses a stored keyword; anything unrecognized is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "SELECT" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "CREATE" => Self::Create,
            "DROP" => Self::Drop,
            "ALTER" => Self::Alter,
            "TRUNCATE" => Self::Truncate,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reason a statement failed validation.
///
/// Violations are collected into a [`ValidationVerdict`]; they are never
/// raised as faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    /// The text could not be tokenized or holds no statement at all.
    #[error("Unable to parse SQL query: {0}")]
    Parse(String),

    /// More than one statement was submitted.
    #[error("Multiple SQL statements not allowed")]
    MultipleStatements,

    /// A destructive statement was evaluated without permission.
    #[error("{0} operation requires confirmation before it can run")]
    PermissionRequired(OperationKind),

    /// A structural attack pattern matched the raw text.
    #[error("Dangerous pattern detected: {}", .0.name())]
    DangerousPattern(DangerousPattern),

    /// The statement references a table outside the allow-list.
    #[error("Unauthorized table: {0}")]
    UnauthorizedTable(String),
}

impl Serialize for Violation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of one safety evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationVerdict {
    /// True when no violation was found.
    pub is_valid: bool,
    /// True when the operation kind can mutate data or schema.
    pub is_destructive: bool,
    /// True when a human must confirm before execution.
    pub requires_confirmation: bool,
    /// Violations in the order they were found.
    pub errors: Vec<Violation>,
    /// Advisory messages that never block execution.
    pub warnings: Vec<String>,
    /// Heuristic complexity score (0 when scoring was skipped).
    pub complexity_score: u32,
    /// Operation kind of the (leading) statement.
    pub operation: OperationKind,
}

impl ValidationVerdict {
    /// Builds a verdict for input that was rejected before any policy check.
    pub(crate) fn rejected(operation: OperationKind, violation: Violation) -> Self {
        Self {
            is_valid: false,
            is_destructive: false,
            requires_confirmation: false,
            errors: vec![violation],
            warnings: Vec::new(),
            complexity_score: 0,
            operation,
        }
    }

    /// Returns true if the statement may run without confirmation.
    pub fn is_safe(&self) -> bool {
        self.is_valid && !self.is_destructive
    }

    /// Returns the error messages in the order they were found.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}
