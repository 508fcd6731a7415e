//! PostgREST execution adapter.
//!
//! Statements run through the `execute_safe_query(query_text)` remote
//! function that a Supabase project exposes at `/rest/v1/rpc/`. Schema is
//! read from the OpenAPI document PostgREST serves at `/rest/v1/`.
//!
//! A project without the remote function is reported as
//! [`GateError::Unavailable`]; no result is ever synthesized for a
//! statement that did not run.

use crate::config::DatabaseConfig;
use crate::db::{Column, DatabaseClient, QueryResult, Schema, Table};
use crate::error::{GateError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Name of the remote function statements are sent to.
pub const EXECUTE_FUNCTION: &str = "execute_safe_query";

/// PostgREST error code for "function not found in schema cache".
const FUNCTION_NOT_FOUND: &str = "PGRST202";

/// PostgREST client.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    base_url: String,
    key: String,
    max_rows: usize,
}

impl RpcClient {
    /// Creates a client for the project at `base_url`.
    pub fn new(base_url: &str, key: &str, settings: &DatabaseConfig) -> Result<Self> {
        url::Url::parse(base_url)
            .map_err(|e| GateError::config(format!("Invalid rpc_url '{base_url}': {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.query_timeout_secs))
            .build()
            .map_err(|e| GateError::connection(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            max_rows: settings.max_rows,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", self.key))
    }

    fn request_error(e: reqwest::Error) -> GateError {
        if e.is_timeout() {
            GateError::query("Request to PostgREST timed out")
        } else if e.is_connect() {
            GateError::connection(format!("Failed to reach PostgREST: {e}"))
        } else {
            GateError::query(format!("PostgREST request failed: {e}"))
        }
    }
}

#[async_trait]
impl DatabaseClient for RpcClient {
    async fn introspect_schema(&self) -> Result<Schema> {
        let url = format!("{}/rest/v1/", self.base_url);
        debug!("Fetching OpenAPI schema from {}", url);

        let response = self
            .authorized(self.client.get(&url))
            .header("Accept", "application/openapi+json")
            .send()
            .await
            .map_err(|e| GateError::schema(format!("Failed to reach PostgREST: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GateError::schema(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(GateError::schema(format!(
                "PostgREST returned {status}: {body}"
            )));
        }

        parse_openapi_schema(&body)
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, EXECUTE_FUNCTION);
        let start = Instant::now();

        let response = self
            .authorized(self.client.post(&url))
            .json(&serde_json::json!({ "query_text": sql }))
            .send()
            .await
            .map_err(Self::request_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GateError::query(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let error = classify_error(status, &body);
            warn!(status = %status, "Remote execution failed: {}", error);
            return Err(error);
        }

        let payload: JsonValue = if body.trim().is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_str(&body)
                .map_err(|e| GateError::query(format!("Invalid response from PostgREST: {e}")))?
        };

        let mut result = QueryResult::from_json_rows(rows_from_payload(payload));
        let total = result.rows.len();
        if total > self.max_rows {
            warn!("Query returned {} rows, truncating to {} rows", total, self.max_rows);
            result.rows.truncate(self.max_rows);
            result.row_count = self.max_rows;
            result.total_rows = Some(total);
            result.was_truncated = true;
        }

        Ok(result.with_execution_time(start.elapsed()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

/// Maps a failed RPC response to an error.
fn classify_error(status: StatusCode, body: &str) -> GateError {
    let parsed = serde_json::from_str::<PostgrestError>(body).ok();
    let code = parsed.as_ref().and_then(|e| e.code.as_deref());

    if code == Some(FUNCTION_NOT_FOUND) || status == StatusCode::NOT_FOUND {
        return GateError::unavailable(format!(
            "remote function {EXECUTE_FUNCTION} is not installed on the database"
        ));
    }

    match parsed {
        Some(PostgrestError {
            message: Some(message),
            hint,
            ..
        }) => match hint {
            Some(hint) => GateError::query(format!("{message}\n  HINT: {hint}")),
            None => GateError::query(message),
        },
        _ => GateError::query(format!("PostgREST returned {status}: {body}")),
    }
}

/// Normalizes the function's JSON result into row objects.
///
/// Arrays of objects are rows; a single object is one row; other values
/// become one row with a `result` column.
fn rows_from_payload(payload: JsonValue) -> Vec<Map<String, JsonValue>> {
    let wrap = |value: JsonValue| match value {
        JsonValue::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    };

    match payload {
        JsonValue::Null => Vec::new(),
        JsonValue::Array(items) => items.into_iter().map(wrap).collect(),
        other => vec![wrap(other)],
    }
}

#[derive(Debug, Deserialize)]
struct OpenApiDocument {
    #[serde(default)]
    definitions: BTreeMap<String, OpenApiDefinition>,
}

#[derive(Debug, Deserialize)]
struct OpenApiDefinition {
    #[serde(default)]
    properties: BTreeMap<String, OpenApiProperty>,
    #[serde(default)]
    required: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OpenApiProperty {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    default: Option<JsonValue>,
}

/// Builds a schema from the PostgREST OpenAPI document.
///
/// PostgREST puts the PostgreSQL type in `format` and marks primary keys
/// with `<pk/>` in the description.
fn parse_openapi_schema(body: &str) -> Result<Schema> {
    let document: OpenApiDocument = serde_json::from_str(body)
        .map_err(|e| GateError::schema(format!("Invalid OpenAPI document: {e}")))?;

    let tables = document
        .definitions
        .into_iter()
        .map(|(name, definition)| {
            let mut table = Table::new(name);
            for (column_name, property) in definition.properties {
                if property
                    .description
                    .as_deref()
                    .is_some_and(|d| d.contains("<pk/>"))
                {
                    table.primary_key.push(column_name.clone());
                }
                table.columns.push(Column {
                    is_nullable: !definition.required.contains(&column_name),
                    name: column_name,
                    data_type: property
                        .format
                        .or(property.kind)
                        .unwrap_or_else(|| "unknown".to_string()),
                    default: property.default.map(|d| match d {
                        JsonValue::String(s) => s,
                        other => other.to_string(),
                    }),
                });
            }
            table
        })
        .collect();

    Ok(Schema {
        tables,
        foreign_keys: Vec::new(),
    })
}
