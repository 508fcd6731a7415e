//! Error types for querygate.
//!
//! Defines the fault enum used by collaborators and the confirmation gate.
//! Safety violations found while validating SQL are not faults; they are
//! collected into a verdict (see `safety::Violation`).

use thiserror::Error;

/// Main error type for querygate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (syntax errors, constraint violations, etc.)
    #[error("Query execution failed: {0}")]
    Query(String),

    /// SQL generation errors (rate limits, auth, timeouts, unparseable output)
    #[error("Failed to generate SQL: {0}")]
    Llm(String),

    /// Schema introspection errors.
    #[error("Failed to fetch database schema: {0}")]
    Schema(String),

    /// A collaborator is reachable but lacks the function it must provide.
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    /// Audit log storage errors.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller went away while the attempt was in flight.
    #[error("Request cancelled")]
    Cancelled,

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query execution error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates an SQL generation error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates a schema error with the given message.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Creates a collaborator-unavailable error with the given message.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Creates a persistence error with the given message.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Llm(_) => "Generation Error",
            Self::Schema(_) => "Schema Error",
            Self::Unavailable(_) => "Unavailable",
            Self::Persistence(_) => "Persistence Error",
            Self::Config(_) => "Configuration Error",
            Self::Cancelled => "Cancelled",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using GateError.
pub type Result<T> = std::result::Result<T, GateError>;
