//! Mock database clients for tests and offline demos.

use super::{Column, ColumnInfo, DatabaseClient, QueryResult, Schema, Table, Value};
use crate::error::{GateError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// A mock database client that returns canned results and records every
/// statement it is asked to run.
#[derive(Debug, Default)]
pub struct MockDatabaseClient {
    schema: Schema,
    result: Option<QueryResult>,
    delay: Option<Duration>,
    executed: Mutex<Vec<String>>,
}

impl MockDatabaseClient {
    /// Creates a mock with an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock with the given schema.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    /// Creates a mock with a small users/products/orders schema.
    pub fn with_sample_schema() -> Self {
        Self::with_schema(sample_schema())
    }

    /// Returns `result` for every statement.
    pub fn with_result(mut self, result: QueryResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Sleeps before answering every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|sql| sql.clone())
            .unwrap_or_default()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn introspect_schema(&self) -> Result<Schema> {
        self.pause().await;
        Ok(self.schema.clone())
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.pause().await;

        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }

        if let Some(result) = &self.result {
            return Ok(result.clone());
        }

        let result = if sql.trim_start().to_uppercase().starts_with("SELECT") {
            QueryResult::with_data(
                vec![ColumnInfo::new("result", "text")],
                vec![vec![Value::String(format!("Mock result for: {}", sql))]],
            )
        } else {
            QueryResult::new()
        };

        Ok(result.with_execution_time(Duration::from_millis(1)))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Which call a [`FailingDatabaseClient`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    Schema,
    Execute,
    /// Execution fails because the remote function is missing.
    Unavailable,
}

/// A client that fails at a chosen point, for error-path tests.
#[derive(Debug)]
pub struct FailingDatabaseClient {
    schema: Schema,
    point: FailurePoint,
    message: String,
}

impl FailingDatabaseClient {
    pub fn new(point: FailurePoint, message: impl Into<String>) -> Self {
        Self {
            schema: sample_schema(),
            point,
            message: message.into(),
        }
    }
}

#[async_trait]
impl DatabaseClient for FailingDatabaseClient {
    async fn introspect_schema(&self) -> Result<Schema> {
        match self.point {
            FailurePoint::Schema => Err(GateError::schema(self.message.clone())),
            _ => Ok(self.schema.clone()),
        }
    }

    async fn execute_query(&self, _sql: &str) -> Result<QueryResult> {
        match self.point {
            FailurePoint::Unavailable => Err(GateError::unavailable(self.message.clone())),
            _ => Err(GateError::query(self.message.clone())),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A small users/products/orders schema used by the mocks and tests.
pub fn sample_schema() -> Schema {
    let id = || Column::new("id", "bigint").nullable(false);
    let created_at = || Column::new("created_at", "timestamp");

    Schema {
        tables: vec![
            Table::new("users")
                .with_column(id())
                .with_column(Column::new("name", "text"))
                .with_column(Column::new("email", "text"))
                .with_column(Column::new("role", "text"))
                .with_column(created_at())
                .with_primary_key(["id"]),
            Table::new("products")
                .with_column(id())
                .with_column(Column::new("name", "text"))
                .with_column(Column::new("price", "numeric"))
                .with_column(Column::new("category", "text"))
                .with_column(created_at())
                .with_primary_key(["id"]),
            Table::new("orders")
                .with_column(id())
                .with_column(Column::new("user_id", "bigint"))
                .with_column(Column::new("status", "text"))
                .with_column(Column::new("total", "numeric"))
                .with_column(created_at())
                .with_primary_key(["id"]),
        ],
        foreign_keys: Vec::new(),
    }
}
