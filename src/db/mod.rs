//! Database abstraction layer.
//!
//! The execution adapter seam: schema introspection and execution of
//! statements that already passed the confirmation gate.

mod mock;
mod postgres;
mod rpc;
mod schema;
mod types;

pub use mock::{sample_schema, FailingDatabaseClient, FailurePoint, MockDatabaseClient};
pub use postgres::PostgresClient;
pub use rpc::RpcClient;
pub use schema::{Column, ColumnDescriptor, ForeignKey, Schema, Table};
pub use types::{ColumnInfo, QueryResult, Row, Value};

use crate::config::DatabaseConfig;
use crate::error::{GateError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Supported execution backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    /// Direct PostgreSQL connection.
    #[default]
    Postgres,
    /// PostgREST `execute_safe_query` remote function (Supabase).
    Rpc,
    /// In-memory mock, for demos and tests.
    Mock,
}

impl DatabaseBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Rpc => "rpc",
            Self::Mock => "mock",
        }
    }
}

/// Creates a database client for the configured backend.
pub async fn connect(config: &DatabaseConfig) -> Result<Box<dyn DatabaseClient>> {
    match config.backend {
        DatabaseBackend::Postgres => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| GateError::config("database.url (or DATABASE_URL) is required"))?;
            let client = PostgresClient::connect(url, config).await?;
            Ok(Box::new(client))
        }
        DatabaseBackend::Rpc => {
            let base_url = config.rpc_url.as_deref().ok_or_else(|| {
                GateError::config("database.rpc_url (or SUPABASE_URL) is required")
            })?;
            let key = config.rpc_key.as_deref().ok_or_else(|| {
                GateError::config("database.rpc_key (or SUPABASE_SERVICE_ROLE_KEY) is required")
            })?;
            let client = RpcClient::new(base_url, key, config)?;
            Ok(Box::new(client))
        }
        DatabaseBackend::Mock => Ok(Box::new(MockDatabaseClient::with_sample_schema())),
    }
}

/// Interface for execution adapters.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Introspects the database schema.
    async fn introspect_schema(&self) -> Result<Schema>;

    /// Executes a SQL statement and returns its rows.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Checks that the backend is reachable.
    async fn health_check(&self) -> Result<()> {
        self.execute_query("SELECT 1").await.map(|_| ())
    }

    /// Closes the connection.
    async fn close(&self) -> Result<()>;
}
