//! Audit log persistence tests.

use std::sync::Arc;

use querygate::audit::{AuditFilter, AuditStatus, SqliteAuditSink};
use querygate::db::MockDatabaseClient;
use querygate::llm::{MockLlmClient, SqlGenerator};
use querygate::query::{ConfirmationGate, GateRequest, GateSettings};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_audit_log_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audit").join("audit.db");

    let sink = Arc::new(SqliteAuditSink::open(&path).await.unwrap());
    let gate = ConfirmationGate::new(
        Arc::new(MockDatabaseClient::with_sample_schema()),
        SqlGenerator::new(Arc::new(MockLlmClient::new())),
        sink.clone(),
        GateSettings::default(),
    );
    let cancel = CancellationToken::new();
    gate.handle(&GateRequest::new("Show me all users"), &cancel)
        .await
        .unwrap();
    gate.handle(&GateRequest::new("Delete the user"), &cancel)
        .await
        .unwrap();
    sink.close().await;
    drop(gate);

    let reopened = SqliteAuditSink::open(&path).await.unwrap();
    assert_eq!(reopened.count().await.unwrap(), 2);

    let executed = reopened
        .list(&AuditFilter {
            status: Some(AuditStatus::Executed),
            limit: None,
        })
        .await
        .unwrap();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].sql.as_deref(), Some("SELECT * FROM users"));
    assert_eq!(executed[0].row_count, Some(1));
    assert!(executed[0].finished_at >= executed[0].started_at);

    let latest = reopened
        .list(&AuditFilter {
            status: None,
            limit: Some(1),
        })
        .await
        .unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].status, AuditStatus::AwaitingConfirmation);
}
