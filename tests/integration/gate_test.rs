//! Confirmation gate tests against the mock collaborators.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use pretty_assertions::assert_eq;
use querygate::audit::{AuditFilter, AuditStatus, MemoryAuditSink, SqliteAuditSink};
use querygate::db::MockDatabaseClient;
use querygate::error::GateError;
use querygate::llm::{MockLlmClient, SqlGenerator};
use querygate::query::{ConfirmationGate, GateOutcome, GateRequest, GateSettings};
use querygate::safety::OperationKind;
use tokio_util::sync::CancellationToken;

fn settings() -> GateSettings {
    GateSettings {
        allow_destructive_queries: true,
        ..GateSettings::default()
    }
}

#[tokio::test]
async fn test_delete_requires_confirmation_then_runs() {
    let db = Arc::new(MockDatabaseClient::with_sample_schema());
    let audit = Arc::new(SqliteAuditSink::in_memory().await.unwrap());
    let gate = ConfirmationGate::new(
        db.clone(),
        SqlGenerator::new(Arc::new(MockLlmClient::new())),
        audit.clone(),
        settings(),
    );
    let cancel = CancellationToken::new();

    let first = gate
        .handle(&GateRequest::new("Delete the user"), &cancel)
        .await
        .unwrap();
    match &first {
        GateOutcome::ConfirmationRequired {
            operation, warning, ..
        } => {
            assert_eq!(*operation, OperationKind::Delete);
            assert_eq!(warning, "This DELETE operation will modify data. Please confirm.");
        }
        other => panic!("expected confirmation, got {other:?}"),
    }
    assert!(db.executed().is_empty());

    let second = gate
        .handle(&GateRequest::new("Delete the user").confirmed(), &cancel)
        .await
        .unwrap();
    assert!(matches!(second, GateOutcome::Executed { .. }));
    assert_eq!(db.executed(), vec!["DELETE FROM users WHERE id = 1".to_string()]);

    let records = audit.list(&AuditFilter::default()).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, AuditStatus::Executed);
    assert!(records[0].confirm_destructive);
    assert_eq!(records[1].status, AuditStatus::AwaitingConfirmation);
    assert!(!records[1].confirm_destructive);
}

#[tokio::test]
async fn test_confirmation_does_not_override_disabled_destructive() {
    let db = Arc::new(MockDatabaseClient::with_sample_schema());
    let audit = Arc::new(MemoryAuditSink::new());
    let gate = ConfirmationGate::new(
        db.clone(),
        SqlGenerator::new(Arc::new(MockLlmClient::new())),
        audit.clone(),
        GateSettings {
            allow_destructive_queries: false,
            ..GateSettings::default()
        },
    );

    let outcome = gate
        .handle(
            &GateRequest::new("Update the user").confirmed(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(matches!(outcome, GateOutcome::Rejected { .. }));
    assert!(db.executed().is_empty());
    assert_eq!(audit.records()[0].status, AuditStatus::Rejected);
}

#[tokio::test]
async fn test_injection_never_reaches_database() {
    let db = Arc::new(MockDatabaseClient::with_sample_schema());
    let llm = MockLlmClient::new()
        .with_sql("stacked", "SELECT * FROM users; DROP TABLE users", 0.9)
        .with_sql("comment", "SELECT * FROM users -- WHERE id = 1", 0.9)
        .with_sql("shell", "SELECT xp_cmdshell('dir')", 0.9);
    let gate = ConfirmationGate::new(
        db.clone(),
        SqlGenerator::new(Arc::new(llm)),
        Arc::new(MemoryAuditSink::new()),
        settings(),
    );
    let cancel = CancellationToken::new();

    for question in ["stacked", "comment", "shell"] {
        let outcome = gate
            .handle(&GateRequest::new(question).confirmed(), &cancel)
            .await
            .unwrap();
        match outcome {
            GateOutcome::Rejected { errors, .. } => assert!(!errors.is_empty(), "{question}"),
            other => panic!("{question}: expected rejection, got {other:?}"),
        }
    }
    assert!(db.executed().is_empty());
}

#[tokio::test]
async fn test_concurrent_attempts_are_each_audited() {
    let audit = Arc::new(MemoryAuditSink::new());
    let gate = Arc::new(ConfirmationGate::new(
        Arc::new(MockDatabaseClient::with_sample_schema().with_delay(Duration::from_millis(5))),
        SqlGenerator::new(Arc::new(MockLlmClient::new())),
        audit.clone(),
        settings(),
    ));

    let questions = ["Show me all users", "Delete the user", "count orders"];
    let attempts = (0..12).map(|i| {
        let gate = Arc::clone(&gate);
        let question = questions[i % questions.len()];
        async move {
            gate.handle(&GateRequest::new(question), &CancellationToken::new())
                .await
        }
    });

    let outcomes = join_all(attempts).await;
    assert!(outcomes.iter().all(Result::is_ok));
    assert_eq!(audit.len(), 12);

    let awaiting = audit
        .records()
        .iter()
        .filter(|r| r.status == AuditStatus::AwaitingConfirmation)
        .count();
    assert_eq!(awaiting, 4);
}

#[tokio::test]
async fn test_cancelled_attempt_is_audited() {
    let db = Arc::new(MockDatabaseClient::with_sample_schema());
    let audit = Arc::new(MemoryAuditSink::new());
    let gate = ConfirmationGate::new(
        db.clone(),
        SqlGenerator::new(Arc::new(
            MockLlmClient::new().with_delay(Duration::from_secs(10)),
        )),
        audit.clone(),
        settings(),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = gate
        .handle(&GateRequest::new("Show me all users"), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::Cancelled));
    assert!(db.executed().is_empty());
    let records = audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AuditStatus::Cancelled);
}
