//! Schema versioning for the audit database.
//!
//! Forward-only migrations tracked in `schema_versions`.

use crate::error::{GateError, Result};
use sqlx::sqlite::SqlitePool;
use tracing::info;

const CURRENT_VERSION: i32 = 1;

/// Runs all pending migrations on the database.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    ensure_schema_versions_table(pool).await?;

    let current = get_current_version(pool).await?;

    if current > CURRENT_VERSION {
        return Err(GateError::persistence(format!(
            "Audit database schema version ({}) is newer than supported version ({})",
            current, CURRENT_VERSION
        )));
    }

    for version in (current + 1)..=CURRENT_VERSION {
        run_migration(pool, version).await?;
        record_version(pool, version).await?;
        info!("Applied audit migration v{}", version);
    }

    Ok(())
}

async fn ensure_schema_versions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| GateError::persistence(format!("Failed to create schema_versions table: {e}")))?;

    Ok(())
}

async fn get_current_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM schema_versions")
        .fetch_optional(pool)
        .await
        .map_err(|e| GateError::persistence(format!("Failed to get schema version: {e}")))?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

async fn record_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_versions (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| GateError::persistence(format!("Failed to record migration: {e}")))?;
    Ok(())
}

async fn run_migration(pool: &SqlitePool, version: i32) -> Result<()> {
    match version {
        1 => migration_v1(pool).await,
        _ => Err(GateError::persistence(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// v1: the audit_log table.
async fn migration_v1(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            question TEXT NOT NULL,
            sql TEXT,
            explanation TEXT,
            confidence REAL NOT NULL DEFAULT 0,
            operation TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN
                ('executed', 'rejected', 'awaiting_confirmation', 'failed', 'cancelled')),
            confirm_destructive INTEGER NOT NULL DEFAULT 0,
            errors TEXT NOT NULL DEFAULT '[]',
            warnings TEXT NOT NULL DEFAULT '[]',
            complexity_score INTEGER,
            row_count INTEGER,
            error_message TEXT,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| GateError::persistence(format!("Failed to create audit_log table: {e}")))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_log_started ON audit_log(started_at)")
        .execute(pool)
        .await
        .map_err(|e| GateError::persistence(format!("Failed to create audit index: {e}")))?;

    Ok(())
}
