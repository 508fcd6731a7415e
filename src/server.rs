//! HTTP transport for the confirmation gate.
//!
//! Routes:
//! - `POST /query`: run one attempt
//! - `GET /schema?table_name=`: column descriptors per table
//! - `POST /ingest`: add a context document
//! - `GET /health`, `GET /`: service status
//!
//! JSON field names are snake_case.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{Config, ServerConfig};
use crate::error::{GateError, Result};
use crate::query::{ConfirmationGate, GateOutcome, GateRequest};

/// Names reported by `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    pub llm: String,
    pub database: String,
}

impl ServiceInfo {
    pub fn from_config(config: &Config) -> Self {
        Self {
            llm: format!("{}/{}", config.llm.provider, config.llm.model),
            database: config.database.backend.as_str().to_string(),
        }
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    gate: Arc<ConfirmationGate>,
    info: Arc<ServiceInfo>,
}

impl AppState {
    pub fn new(gate: ConfirmationGate, info: ServiceInfo) -> Self {
        Self {
            gate: Arc::new(gate),
            info: Arc::new(info),
        }
    }

    pub fn gate(&self) -> &Arc<ConfirmationGate> {
        &self.gate
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

fn json_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
}

/// Maps a gate fault to its HTTP status.
pub fn status_for(error: &GateError) -> StatusCode {
    match error {
        GateError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GateError::Cancelled => StatusCode::REQUEST_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Renders an outcome as the status and JSON body returned by `POST /query`.
pub fn outcome_body(outcome: &GateOutcome) -> (StatusCode, Value) {
    match outcome {
        GateOutcome::Executed {
            sql,
            explanation,
            confidence,
            result,
            warnings,
        } => (
            StatusCode::OK,
            json!({
                "sql": sql,
                "explanation": explanation,
                "confidence": confidence,
                "results": result.to_json_rows(),
                "result_count": result.row_count,
                "warnings": warnings,
            }),
        ),
        GateOutcome::ConfirmationRequired {
            operation,
            sql,
            explanation,
            confidence,
            warning,
            warnings,
        } => (
            StatusCode::OK,
            json!({
                "requires_confirmation": true,
                "operation_type": operation.as_str(),
                "sql": sql,
                "explanation": explanation,
                "confidence": confidence,
                "warning": warning,
                "warnings": warnings,
            }),
        ),
        GateOutcome::Rejected { errors, .. } => (
            StatusCode::BAD_REQUEST,
            json!({
                "detail": format!(
                    "Generated SQL failed safety validation: {}",
                    errors.join("; ")
                ),
            }),
        ),
    }
}

/// Builds the router with CORS for `cors_origins`.
pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/query", post(query))
        .route("/schema", get(schema))
        .route("/ingest", post(ingest))
        .route("/health", get(health))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(parsed))
}

/// Serves until Ctrl-C.
pub async fn serve(config: &ServerConfig, state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| GateError::config(format!("Invalid listen address: {e}")))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GateError::connection(format!("Failed to bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state, &config.cors_origins))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await
        .map_err(|e| GateError::internal(format!("Server error: {e}")))
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    let context = if state.gate.retriever().is_some() {
        "enabled"
    } else {
        "disabled"
    };
    Json(json!({
        "status": "healthy",
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "llm": state.info.llm,
            "database": state.info.database,
            "context": context,
        }
    }))
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default, alias = "use_rag")]
    pub use_context: bool,
    #[serde(default)]
    pub confirm_destructive: bool,
}

async fn query(
    State(state): State<AppState>,
    req: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> std::result::Result<(StatusCode, Json<Value>), ApiError> {
    let Json(req) = req.map_err(|e| json_error(StatusCode::BAD_REQUEST, e.body_text()))?;

    if req.query.trim().is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "query must not be empty"));
    }

    let request = GateRequest {
        query: req.query,
        use_context: req.use_context,
        confirm_destructive: req.confirm_destructive,
    };

    // The attempt runs in its own task so a client disconnect (which drops
    // this future and the guard) cancels it without skipping the audit write.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let gate = Arc::clone(&state.gate);
    let task = tokio::spawn(async move { gate.handle(&request, &cancel).await });

    let joined = task.await;
    guard.disarm();

    let outcome = joined
        .map_err(|e| {
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {e}"),
            )
        })?
        .map_err(|e| json_error(status_for(&e), e.to_string()))?;

    let (status, body) = outcome_body(&outcome);
    Ok((status, Json(body)))
}

#[derive(Debug, Deserialize)]
struct SchemaParams {
    table_name: Option<String>,
}

async fn schema(
    State(state): State<AppState>,
    Query(params): Query<SchemaParams>,
) -> std::result::Result<Json<Value>, ApiError> {
    let schema = state
        .gate
        .schema()
        .await
        .map_err(|e| json_error(status_for(&e), e.to_string()))?;

    Ok(Json(json!({
        "schema": schema.to_descriptor_map(params.table_name.as_deref()),
    })))
}

#[derive(Debug, Deserialize)]
struct IngestRequest {
    content: String,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

async fn ingest(
    State(state): State<AppState>,
    req: std::result::Result<Json<IngestRequest>, JsonRejection>,
) -> std::result::Result<Json<Value>, ApiError> {
    let Json(req) = req.map_err(|e| json_error(StatusCode::BAD_REQUEST, e.body_text()))?;

    let retriever = state.gate.retriever().ok_or_else(|| {
        json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Context retrieval is disabled",
        )
    })?;

    let source = req.metadata.get("source").and_then(Value::as_str);
    let chunks = retriever
        .ingest(&req.content, source)
        .await
        .map_err(|e| json_error(status_for(&e), e.to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "message": "Document ingested successfully",
        "chunks": chunks,
    })))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let mut services = BTreeMap::new();
    let mut status = "healthy";

    match state.gate.database().health_check().await {
        Ok(()) => {
            services.insert("database", "connected".to_string());
        }
        Err(e) => {
            services.insert("database", format!("error: {e}"));
            status = "degraded";
        }
    }
    services.insert("llm", "ready".to_string());

    Json(json!({
        "status": status,
        "services": services,
    }))
}
