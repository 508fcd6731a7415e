//! PostgreSQL execution adapter.
//!
//! Runs approved statements over a sqlx connection pool and introspects
//! the `public` schema through information_schema.

use crate::config::{ConnectionConfig, DatabaseConfig};
use crate::db::{Column, ColumnInfo, DatabaseClient, ForeignKey, QueryResult, Row, Schema, Table, Value};
use crate::error::{GateError, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, TypeInfo};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
    query_timeout: Duration,
    max_rows: usize,
}

impl PostgresClient {
    /// Connects with retries on transient errors.
    pub async fn connect(url: &str, settings: &DatabaseConfig) -> Result<Self> {
        let config = ConnectionConfig::from_connection_string(url)?;
        let conn_str = config.to_connection_string()?;

        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        loop {
            debug!(
                "Connecting to {} (attempt {} of {})",
                config.display_string(),
                attempt,
                MAX_RETRY_ATTEMPTS
            );

            let result = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&conn_str)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Connected to database");
                    return Ok(Self::from_pool(pool, settings));
                }
                Err(e) if attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e) => {
                    warn!(
                        "Connection attempt {} failed (transient error), retrying in {:?}",
                        attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(map_connection_error(e, &config)),
            }
        }
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool, settings: &DatabaseConfig) -> Self {
        Self {
            pool,
            query_timeout: Duration::from_secs(settings.query_timeout_secs),
            max_rows: settings.max_rows,
        }
    }

    async fn fetch_tables(&self) -> Result<Vec<Table>> {
        let rows: Vec<(String, String, String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT
                c.table_name::text,
                c.column_name::text,
                c.data_type::text,
                c.is_nullable::text,
                c.column_default::text
            FROM information_schema.columns c
            JOIN information_schema.tables t
                ON t.table_name = c.table_name AND t.table_schema = c.table_schema
            WHERE c.table_schema = 'public' AND t.table_type = 'BASE TABLE'
            ORDER BY c.table_name, c.ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GateError::schema(format!("Failed to fetch columns: {e}")))?;

        let mut tables: BTreeMap<String, Table> = BTreeMap::new();
        for (table_name, name, data_type, is_nullable, default) in rows {
            tables
                .entry(table_name.clone())
                .or_insert_with(|| Table::new(table_name))
                .columns
                .push(Column {
                    name,
                    data_type,
                    is_nullable: is_nullable == "YES",
                    default,
                });
        }

        for (table_name, column) in self.fetch_primary_keys().await? {
            if let Some(table) = tables.get_mut(&table_name) {
                table.primary_key.push(column);
            }
        }

        Ok(tables.into_values().collect())
    }

    async fn fetch_primary_keys(&self) -> Result<Vec<(String, String)>> {
        sqlx::query_as(
            r#"
            SELECT tc.table_name::text, kcu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            WHERE tc.table_schema = 'public'
                AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY tc.table_name, kcu.ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GateError::schema(format!("Failed to fetch primary keys: {e}")))
    }

    async fn fetch_foreign_keys(&self) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT
                tc.constraint_name::text,
                kcu.table_name::text,
                kcu.column_name::text,
                ccu.table_name::text,
                ccu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON tc.constraint_name = ccu.constraint_name
                AND tc.table_schema = ccu.table_schema
            WHERE tc.table_schema = 'public'
                AND tc.constraint_type = 'FOREIGN KEY'
            ORDER BY tc.constraint_name, kcu.ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GateError::schema(format!("Failed to fetch foreign keys: {e}")))?;

        let mut by_constraint: BTreeMap<String, ForeignKey> = BTreeMap::new();
        for (constraint, from_table, from_column, to_table, to_column) in rows {
            let fk = by_constraint.entry(constraint).or_insert_with(|| ForeignKey {
                from_table,
                to_table,
                ..ForeignKey::default()
            });
            fk.from_columns.push(from_column);
            fk.to_columns.push(to_column);
        }

        Ok(by_constraint.into_values().collect())
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn introspect_schema(&self) -> Result<Schema> {
        let tables = self.fetch_tables().await?;
        let foreign_keys = self.fetch_foreign_keys().await?;

        Ok(Schema {
            tables,
            foreign_keys,
        })
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(self.query_timeout, sqlx::query(sql).fetch_all(&self.pool))
            .await
            .map_err(|_| {
                GateError::query(format!(
                    "Query timed out after {} seconds",
                    self.query_timeout.as_secs()
                ))
            })?
            .map_err(|e| GateError::query(format_query_error(e)))?;

        let execution_time = start.elapsed();

        let columns: Vec<ColumnInfo> = result
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                    .collect()
            })
            .unwrap_or_default();

        let total_rows = result.len();
        let was_truncated = total_rows > self.max_rows;
        if was_truncated {
            warn!(
                "Query returned {} rows, truncating to {} rows",
                total_rows, self.max_rows
            );
        }

        let rows: Vec<Row> = result.iter().take(self.max_rows).map(convert_row).collect();
        let row_count = rows.len();

        Ok(QueryResult {
            columns,
            rows,
            execution_time,
            row_count,
            total_rows: Some(total_rows),
            was_truncated,
        })
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Decodes one column by its PostgreSQL type name. Unknown types are read as text.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    fn get<'r, T>(row: &'r PgRow, index: usize) -> Option<T>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        row.try_get::<Option<T>, _>(index).ok().flatten()
    }

    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => get::<bool>(row, index).into(),
        "INT2" | "SMALLINT" => get::<i16>(row, index).map(i64::from).into(),
        "INT4" | "INT" | "INTEGER" => get::<i32>(row, index).map(i64::from).into(),
        "INT8" | "BIGINT" => get::<i64>(row, index).into(),
        "FLOAT4" | "REAL" => get::<f32>(row, index).map(f64::from).into(),
        "FLOAT8" | "DOUBLE PRECISION" => get::<f64>(row, index).into(),
        "BYTEA" => get::<Vec<u8>>(row, index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        "JSON" | "JSONB" => get::<serde_json::Value>(row, index)
            .map(Value::Json)
            .unwrap_or(Value::Null),
        _ => get::<String>(row, index).into(),
    }
}

/// Returns true for errors worth retrying a connection over.
fn is_transient_error(error: &sqlx::Error) -> bool {
    if matches!(error, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) {
        return true;
    }

    let error_str = error.to_string().to_lowercase();
    [
        "connection refused",
        "timed out",
        "temporarily unavailable",
        "connection reset",
        "broken pipe",
    ]
    .iter()
    .any(|needle| error_str.contains(needle))
}

fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> GateError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        GateError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("authentication failed") {
        GateError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        GateError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        GateError::connection(format!("Connection to {host}:{port} timed out."))
    } else {
        GateError::connection(error.to_string())
    }
}

/// Formats a query error with PostgreSQL detail and hint lines when present.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut message = format!("PostgreSQL Error: {}", db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            message.push_str("\n  DETAIL: ");
            message.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            message.push_str("\n  HINT: ");
            message.push_str(hint);
        }
    }

    message
}
