//! Audit trail for query attempts.
//!
//! Every attempt handled by the gate ends with exactly one [`AuditRecord`]
//! handed to an [`AuditSink`]. Sinks may fail; the gate logs the failure
//! and never lets it change the response.

mod memory;
mod migrations;
mod sqlite;

pub use memory::{MemoryAuditSink, TracingAuditSink};
pub use sqlite::{AuditFilter, SqliteAuditSink};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AuditConfig;
use crate::error::Result;
use crate::safety::OperationKind;

/// Final status of an attempt as recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Executed,
    Rejected,
    AwaitingConfirmation,
    Failed,
    /// The caller disconnected before the attempt finished.
    Cancelled,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executed => "executed",
            Self::Rejected => "rejected",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "executed" => Self::Executed,
            "rejected" => Self::Rejected,
            "awaiting_confirmation" => Self::AwaitingConfirmation,
            "cancelled" => Self::Cancelled,
            _ => Self::Failed,
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable summary of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub question: String,
    pub sql: Option<String>,
    pub explanation: Option<String>,
    /// Model confidence in [0, 1]; 0 when generation never completed.
    pub confidence: f64,
    pub operation: OperationKind,
    pub status: AuditStatus,
    pub confirm_destructive: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub complexity_score: Option<u32>,
    pub row_count: Option<usize>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// Builds the sink described by `[audit]`: SQLite when enabled, otherwise
/// the log only.
pub async fn from_config(config: &AuditConfig) -> Result<Arc<dyn AuditSink>> {
    if !config.enabled {
        return Ok(Arc::new(TracingAuditSink));
    }
    let sink = SqliteAuditSink::open(&config.resolved_path()).await?;
    Ok(Arc::new(sink))
}

#[cfg(test)]
pub(crate) fn sample_record(status: AuditStatus) -> AuditRecord {
    let started_at = Utc::now();
    AuditRecord {
        question: "Delete user 5".to_string(),
        sql: Some("DELETE FROM users WHERE id = 5".to_string()),
        explanation: Some("Deletes user 5".to_string()),
        confidence: 0.9,
        operation: OperationKind::Delete,
        status,
        confirm_destructive: false,
        errors: Vec::new(),
        warnings: Vec::new(),
        complexity_score: Some(10),
        row_count: None,
        error_message: None,
        started_at,
        finished_at: started_at + chrono::Duration::milliseconds(12),
    }
}
