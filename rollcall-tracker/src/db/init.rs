//! Database initialization
//!
//! Creates the database file on first run and the schema on every open.
//! All statements are idempotent.

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// SQLite busy timeout; a writer waits this long for another connection's commit
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Open (creating if needed) the database at `db_path` and ensure the schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_identities_table(pool).await?;
    create_ledgers_table(pool).await?;
    create_ledger_days_table(pool).await?;
    create_status_log_table(pool).await?;
    create_quarantined_days_table(pool).await?;
    Ok(())
}

async fn create_identities_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS identities (
            name TEXT PRIMARY KEY,
            identity_id TEXT NOT NULL UNIQUE,
            enrolled_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Ledger header; the summary columns mirror the day rows
async fn create_ledgers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledgers (
            identity_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            working_days INTEGER NOT NULL DEFAULT 0,
            total_worked_secs INTEGER NOT NULL DEFAULT 0,
            days_late INTEGER NOT NULL DEFAULT 0,
            total_late_secs INTEGER NOT NULL DEFAULT 0,
            days_overtime INTEGER NOT NULL DEFAULT 0,
            total_overtime_secs INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (identity_id, year, month)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per identity per calendar date; the primary key rules out duplicates
async fn create_ledger_days_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledger_days (
            identity_id TEXT NOT NULL,
            date TEXT NOT NULL,
            weekday TEXT NOT NULL,
            is_weekend INTEGER NOT NULL DEFAULT 0,
            first_in TEXT,
            last_out TEXT,
            total_secs INTEGER,
            status TEXT NOT NULL DEFAULT 'NOT PRESENT',
            late_secs INTEGER NOT NULL DEFAULT 0,
            overtime_secs INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (identity_id, date)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_status_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS status_log (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            logged_at TEXT NOT NULL,
            name TEXT NOT NULL,
            identity_id TEXT NOT NULL,
            status TEXT NOT NULL,
            check_in_time TEXT,
            check_out_time TEXT,
            duration_secs INTEGER,
            confidence REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_status_log_identity ON status_log(identity_id, logged_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Raw copies of day rows that failed validation; columns are untyped on purpose
async fn create_quarantined_days_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quarantined_days (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            quarantined_at TEXT NOT NULL,
            reason TEXT NOT NULL,
            identity_id,
            date,
            weekday,
            is_weekend,
            first_in,
            last_out,
            total_secs,
            status,
            late_secs,
            overtime_secs
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_creates_missing_database() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("rollcall.db");

        let pool = init_database(&db_path).await.unwrap();
        assert!(db_path.exists());

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(
            tables,
            vec!["identities", "ledger_days", "ledgers", "quarantined_days", "status_log"]
        );
    }

    #[tokio::test]
    async fn test_reopen_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("rollcall.db");

        let first = init_database(&db_path).await.unwrap();
        first.close().await;
        let second = init_database(&db_path).await.unwrap();

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&second)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
