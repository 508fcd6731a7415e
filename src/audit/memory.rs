//! Sinks that keep records in memory or only log them.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{AuditRecord, AuditSink};
use crate::error::{GateError, Result};

/// Writes each record as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        tracing::info!(
            target: "querygate::audit",
            status = %record.status,
            operation = %record.operation,
            confidence = record.confidence,
            duration_ms = record.duration_ms(),
            errors = record.errors.len(),
            "Query attempt finished"
        );
        Ok(())
    }
}

/// Keeps records in memory. Used by tests and the `ask` command.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
    fail_with: Option<String>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every write fails with a persistence error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail_with: Some(message.into()),
        }
    }

    /// Returns a copy of the records written so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        if let Some(message) = &self.fail_with {
            return Err(GateError::persistence(message.clone()));
        }
        self.records
            .lock()
            .map_err(|_| GateError::internal("audit store lock poisoned"))?
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{sample_record, AuditStatus};

    #[tokio::test]
    async fn test_memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        sink.record(&sample_record(AuditStatus::AwaitingConfirmation))
            .await
            .unwrap();
        sink.record(&sample_record(AuditStatus::Executed)).await.unwrap();

        let statuses: Vec<_> = sink.records().iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![AuditStatus::AwaitingConfirmation, AuditStatus::Executed]
        );
    }

    #[tokio::test]
    async fn test_failing_sink() {
        let sink = MemoryAuditSink::failing("disk full");
        let err = sink
            .record(&sample_record(AuditStatus::Executed))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Persistence(_)));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        assert!(TracingAuditSink
            .record(&sample_record(AuditStatus::Failed))
            .await
            .is_ok());
    }
}
