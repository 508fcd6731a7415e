//! Postgres adapter tests.
//!
//! Skipped unless DATABASE_URL points at a reachable database.

use std::sync::Arc;

use querygate::audit::MemoryAuditSink;
use querygate::config::DatabaseConfig;
use querygate::db::{DatabaseClient, PostgresClient, Value};
use querygate::llm::{MockLlmClient, SqlGenerator};
use querygate::query::{ConfirmationGate, GateOutcome, GateRequest, GateSettings};
use tokio_util::sync::CancellationToken;

/// Helper to create a test client.
async fn get_test_client() -> Option<PostgresClient> {
    let url = std::env::var("DATABASE_URL").ok()?;
    PostgresClient::connect(&url, &DatabaseConfig::default())
        .await
        .ok()
}

#[tokio::test]
async fn test_execute_simple_select() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = client
        .execute_query("SELECT 1 as num, 'hello' as greeting")
        .await
        .unwrap();

    assert_eq!(result.columns.len(), 2);
    assert_eq!(result.columns[0].name, "num");
    assert_eq!(result.row_count, 1);
    assert!(matches!(result.rows[0][0], Value::Int(1)));
    assert!(matches!(&result.rows[0][1], Value::String(s) if s == "hello"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_syntax_error_is_query_error() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = client.execute_query("SELEC 1").await.unwrap_err();
    assert!(matches!(err, querygate::error::GateError::Query(_)));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_gate_runs_against_postgres() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let schema = client.introspect_schema().await.unwrap();
    if schema.tables.is_empty() {
        eprintln!("Skipping test: database has no tables");
        return;
    }

    let table = schema.tables[0].name.clone();
    let llm = MockLlmClient::new().with_sql("first rows", &format!("SELECT * FROM {table} LIMIT 3"), 0.9);
    let gate = ConfirmationGate::new(
        Arc::new(client),
        SqlGenerator::new(Arc::new(llm)),
        Arc::new(MemoryAuditSink::new()),
        GateSettings::default(),
    );

    let outcome = gate
        .handle(&GateRequest::new("first rows"), &CancellationToken::new())
        .await
        .unwrap();
    match outcome {
        GateOutcome::Executed { result, .. } => assert!(result.row_count <= 3),
        other => panic!("expected execution, got {other:?}"),
    }
}
