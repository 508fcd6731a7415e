//! SQLite-backed audit log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use super::{migrations, AuditRecord, AuditSink, AuditStatus};
use crate::error::{GateError, Result};
use crate::safety::OperationKind;

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 100;

/// Audit sink writing one row per attempt into `audit_log`.
#[derive(Debug, Clone)]
pub struct SqliteAuditSink {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

/// Filter options for listing audit records.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub status: Option<AuditStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, FromRow)]
struct AuditRow {
    question: String,
    sql: Option<String>,
    explanation: Option<String>,
    confidence: f64,
    operation: String,
    status: String,
    confirm_destructive: bool,
    errors: String,
    warnings: String,
    complexity_score: Option<i64>,
    row_count: Option<i64>,
    error_message: Option<String>,
    started_at: String,
    finished_at: String,
}

impl TryFrom<AuditRow> for AuditRecord {
    type Error = GateError;

    fn try_from(row: AuditRow) -> Result<Self> {
        Ok(Self {
            question: row.question,
            sql: row.sql,
            explanation: row.explanation,
            confidence: row.confidence,
            operation: OperationKind::parse(&row.operation),
            status: AuditStatus::parse(&row.status),
            confirm_destructive: row.confirm_destructive,
            errors: decode_list(&row.errors)?,
            warnings: decode_list(&row.warnings)?,
            complexity_score: row.complexity_score.map(|s| s as u32),
            row_count: row.row_count.map(|n| n as usize),
            error_message: row.error_message,
            started_at: decode_time(&row.started_at)?,
            finished_at: decode_time(&row.finished_at)?,
        })
    }
}

impl SqliteAuditSink {
    /// Opens or creates the audit database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GateError::persistence(format!("Failed to create audit directory: {e}"))
            })?;
        }

        let mut last_error = None;
        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * 2u64.pow(attempt)))
                    .await;
            }

            match Self::connect(path).await {
                Ok(pool) => {
                    migrations::run_migrations(&pool).await?;
                    info!("Audit database opened at {}", path.display());
                    return Ok(Self {
                        pool,
                        path: Some(path.to_path_buf()),
                    });
                }
                Err(e) => {
                    warn!("Failed to open audit database (attempt {}): {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| GateError::persistence("Failed to open audit database after retries")))
    }

    /// Opens a private in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| GateError::persistence(format!("Failed to open audit database: {e}")))?;
        migrations::run_migrations(&pool).await?;
        Ok(Self { pool, path: None })
    }

    async fn connect(path: &Path) -> Result<SqlitePool> {
        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(|e| GateError::persistence(format!("Invalid audit database path: {e}")))?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| GateError::persistence(format!("Failed to connect to audit database: {e}")))
    }

    /// Returns the database file path, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Lists records, newest first.
    pub async fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>> {
        let mut query = String::from(
            r#"
            SELECT question, sql, explanation, confidence, operation, status,
                   confirm_destructive, errors, warnings, complexity_score,
                   row_count, error_message, started_at, finished_at
            FROM audit_log
            WHERE 1=1
            "#,
        );

        if filter.status.is_some() {
            query.push_str(" AND status = ?");
        }
        query.push_str(" ORDER BY id DESC");
        if filter.limit.is_some() {
            query.push_str(" LIMIT ?");
        }

        let mut sqlx_query = sqlx::query_as::<_, AuditRow>(&query);
        if let Some(status) = filter.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(limit) = filter.limit {
            sqlx_query = sqlx_query.bind(limit);
        }

        let rows = sqlx_query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| GateError::persistence(format!("Failed to list audit records: {e}")))?;

        rows.into_iter().map(AuditRecord::try_from).collect()
    }

    /// Returns the number of stored records.
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_log")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| GateError::persistence(format!("Failed to count audit records: {e}")))?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log
            (question, sql, explanation, confidence, operation, status, confirm_destructive,
             errors, warnings, complexity_score, row_count, error_message, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.question)
        .bind(&record.sql)
        .bind(&record.explanation)
        .bind(record.confidence)
        .bind(record.operation.as_str())
        .bind(record.status.as_str())
        .bind(record.confirm_destructive)
        .bind(encode_list(&record.errors)?)
        .bind(encode_list(&record.warnings)?)
        .bind(record.complexity_score.map(i64::from))
        .bind(record.row_count.map(|n| n as i64))
        .bind(&record.error_message)
        .bind(record.started_at.to_rfc3339())
        .bind(record.finished_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| GateError::persistence(format!("Failed to write audit record: {e}")))?;

        Ok(())
    }
}

fn encode_list(items: &[String]) -> Result<String> {
    serde_json::to_string(items)
        .map_err(|e| GateError::persistence(format!("Failed to encode audit field: {e}")))
}

fn decode_list(text: &str) -> Result<Vec<String>> {
    serde_json::from_str(text)
        .map_err(|e| GateError::persistence(format!("Corrupt audit field: {e}")))
}

fn decode_time(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| GateError::persistence(format!("Corrupt audit timestamp: {e}")))
}
