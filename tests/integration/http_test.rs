//! HTTP flow tests over a real listener.

use std::sync::Arc;

use querygate::audit::{AuditStatus, MemoryAuditSink};
use querygate::db::MockDatabaseClient;
use querygate::llm::{MockLlmClient, SqlGenerator};
use querygate::query::{ConfirmationGate, GateSettings};
use querygate::server::{router, AppState, ServiceInfo};
use serde_json::{json, Value};

async fn spawn_service(audit: Arc<MemoryAuditSink>, db: Arc<MockDatabaseClient>) -> String {
    let gate = ConfirmationGate::new(
        db,
        SqlGenerator::new(Arc::new(MockLlmClient::new())),
        audit,
        GateSettings {
            allow_destructive_queries: true,
            ..GateSettings::default()
        },
    );
    let info = ServiceInfo {
        llm: "mock/mock".to_string(),
        database: "mock".to_string(),
    };
    let app = router(AppState::new(gate, info), &["*".to_string()]);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

async fn post(client: &reqwest::Client, url: String, body: Value) -> (u16, Value) {
    let response = client.post(url).json(&body).send().await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_confirmation_flow_over_http() {
    let audit = Arc::new(MemoryAuditSink::new());
    let db = Arc::new(MockDatabaseClient::with_sample_schema());
    let base = spawn_service(audit.clone(), db.clone()).await;
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        format!("{base}/query"),
        json!({"query": "Update the user name"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["requires_confirmation"], true);
    assert_eq!(body["operation_type"], "UPDATE");
    assert_eq!(body["sql"], "UPDATE users SET name = 'Updated Name' WHERE id = 1");
    assert!(db.executed().is_empty());

    let (status, body) = post(
        &client,
        format!("{base}/query"),
        json!({"query": "Update the user name", "confirm_destructive": true}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["result_count"], 0);
    assert_eq!(db.executed().len(), 1);

    let statuses: Vec<AuditStatus> = audit.records().iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![AuditStatus::AwaitingConfirmation, AuditStatus::Executed]
    );
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let audit = Arc::new(MemoryAuditSink::new());
    let base = spawn_service(audit.clone(), Arc::new(MockDatabaseClient::with_sample_schema())).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/query"))
        .header("content-type", "application/json")
        .body("{\"confirm_destructive\": true}")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].is_string());
    assert!(audit.is_empty());
}

#[tokio::test]
async fn test_schema_lists_every_table() {
    let audit = Arc::new(MemoryAuditSink::new());
    let base = spawn_service(audit, Arc::new(MockDatabaseClient::with_sample_schema())).await;

    let body: Value = reqwest::get(format!("{base}/schema"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let tables: Vec<&String> = body["schema"].as_object().unwrap().keys().collect();
    assert_eq!(tables, ["orders", "products", "users"]);
}
