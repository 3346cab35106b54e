//! Ledger persistence
//!
//! A ledger is stored as one header row in `ledgers` (key plus summary)
//! and one row per calendar day in `ledger_days`. Writers take a
//! `&mut SqliteConnection` so they can run inside the caller's transaction.

use crate::error::Result;
use crate::ledger::{DayRecord, DayStatus, LedgerKey, LedgerSummary, MonthlyLedger};
use chrono::{NaiveDate, NaiveDateTime};
use rollcall_common::human_time::{format_clock, parse_clock};
use rollcall_common::time::{format_date, format_timestamp, parse_date};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::warn;

/// What the database holds for a ledger key
#[derive(Debug)]
pub enum StoredLedger {
    /// Never created
    Absent,
    Valid(MonthlyLedger),
    /// Rows exist but do not form a valid month
    Corrupt { reason: String },
}

const DAY_COLUMNS: &str = "date, first_in, last_out, total_secs, status, late_secs, overtime_secs";

/// `YYYY-MM` prefix shared by every date of the ledger's month
fn month_prefix(key: &LedgerKey) -> String {
    format!("{:04}-{:02}", key.year, key.month)
}

fn decode<'r, T>(row: &'r SqliteRow, column: &str) -> std::result::Result<T, String>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| format!("unreadable column {}: {}", column, e))
}

fn decode_clock(row: &SqliteRow, column: &str) -> std::result::Result<Option<chrono::NaiveTime>, String> {
    let text: Option<String> = decode(row, column)?;
    text.map(|t| parse_clock(&t).map_err(|e| e.to_string()))
        .transpose()
}

/// Rebuild a day record from a stored row
fn day_from_row(row: &SqliteRow) -> std::result::Result<DayRecord, String> {
    let date_text: String = decode(row, "date")?;
    let date = parse_date(&date_text).ok_or_else(|| format!("invalid date '{}'", date_text))?;
    let status_text: String = decode(row, "status")?;
    let status = DayStatus::parse(&status_text)
        .ok_or_else(|| format!("{}: unknown status '{}'", date, status_text))?;

    Ok(DayRecord {
        date,
        first_in: decode_clock(row, "first_in")?,
        last_out: decode_clock(row, "last_out")?,
        total_secs: decode(row, "total_secs")?,
        status,
        late_secs: decode(row, "late_secs")?,
        overtime_secs: decode(row, "overtime_secs")?,
    })
}

async fn header_exists(conn: &mut SqliteConnection, key: &LedgerKey) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM ledgers WHERE identity_id = ? AND year = ? AND month = ?",
    )
    .bind(&key.identity_id)
    .bind(key.year)
    .bind(key.month)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count > 0)
}

/// Read a ledger and check it is a complete, consistent month
pub async fn load(conn: &mut SqliteConnection, key: &LedgerKey) -> Result<StoredLedger> {
    let has_header = header_exists(conn, key).await?;

    let rows = sqlx::query(&format!(
        "SELECT {} FROM ledger_days WHERE identity_id = ? AND substr(date, 1, 7) = ? ORDER BY date",
        DAY_COLUMNS
    ))
    .bind(&key.identity_id)
    .bind(month_prefix(key))
    .fetch_all(&mut *conn)
    .await?;

    if !has_header && rows.is_empty() {
        return Ok(StoredLedger::Absent);
    }
    if !has_header {
        return Ok(StoredLedger::Corrupt {
            reason: "day rows without ledger header".to_string(),
        });
    }

    let days = match rows.iter().map(day_from_row).collect::<std::result::Result<Vec<_>, _>>() {
        Ok(days) => days,
        Err(reason) => return Ok(StoredLedger::Corrupt { reason }),
    };

    match MonthlyLedger::from_rows(key.clone(), days) {
        Ok(ledger) => Ok(StoredLedger::Valid(ledger)),
        Err(reason) => Ok(StoredLedger::Corrupt { reason }),
    }
}

/// Write a new ledger: header and every day row
pub async fn insert_ledger(
    conn: &mut SqliteConnection,
    ledger: &MonthlyLedger,
    updated_at: NaiveDateTime,
) -> Result<()> {
    let key = ledger.key();
    let summary = ledger.summary();
    sqlx::query(
        r#"
        INSERT INTO ledgers (
            identity_id, year, month,
            working_days, total_worked_secs, days_late, total_late_secs,
            days_overtime, total_overtime_secs, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&key.identity_id)
    .bind(key.year)
    .bind(key.month)
    .bind(summary.working_days)
    .bind(summary.total_worked_secs)
    .bind(summary.days_late)
    .bind(summary.total_late_secs)
    .bind(summary.days_overtime)
    .bind(summary.total_overtime_secs)
    .bind(format_timestamp(updated_at))
    .execute(&mut *conn)
    .await?;

    for day in ledger.days() {
        sqlx::query(
            r#"
            INSERT INTO ledger_days (
                identity_id, date, weekday, is_weekend,
                first_in, last_out, total_secs, status, late_secs, overtime_secs
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&key.identity_id)
        .bind(format_date(day.date()))
        .bind(day.date().format("%A").to_string())
        .bind(day.is_weekend())
        .bind(day.first_in().map(format_clock))
        .bind(day.last_out().map(format_clock))
        .bind(day.total_secs())
        .bind(day.status().as_str())
        .bind(day.late_secs())
        .bind(day.overtime_secs())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Overwrite the mutable fields of one day row
pub async fn update_day(
    conn: &mut SqliteConnection,
    identity_id: &str,
    day: &DayRecord,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE ledger_days
        SET first_in = ?, last_out = ?, total_secs = ?, status = ?,
            late_secs = ?, overtime_secs = ?
        WHERE identity_id = ? AND date = ?
        "#,
    )
    .bind(day.first_in().map(format_clock))
    .bind(day.last_out().map(format_clock))
    .bind(day.total_secs())
    .bind(day.status().as_str())
    .bind(day.late_secs())
    .bind(day.overtime_secs())
    .bind(identity_id)
    .bind(format_date(day.date()))
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Store a freshly recomputed summary on the ledger header
pub async fn update_summary(
    conn: &mut SqliteConnection,
    key: &LedgerKey,
    summary: &LedgerSummary,
    updated_at: NaiveDateTime,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE ledgers
        SET working_days = ?, total_worked_secs = ?, days_late = ?, total_late_secs = ?,
            days_overtime = ?, total_overtime_secs = ?, updated_at = ?
        WHERE identity_id = ? AND year = ? AND month = ?
        "#,
    )
    .bind(summary.working_days)
    .bind(summary.total_worked_secs)
    .bind(summary.days_late)
    .bind(summary.total_late_secs)
    .bind(summary.days_overtime)
    .bind(summary.total_overtime_secs)
    .bind(format_timestamp(updated_at))
    .bind(&key.identity_id)
    .bind(key.year)
    .bind(key.month)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Move a ledger's day rows to `quarantined_days` and drop its header
///
/// Returns the number of day rows moved.
pub async fn quarantine(
    conn: &mut SqliteConnection,
    key: &LedgerKey,
    reason: &str,
    at: NaiveDateTime,
) -> Result<u64> {
    let moved = sqlx::query(
        r#"
        INSERT INTO quarantined_days (
            quarantined_at, reason, identity_id, date, weekday, is_weekend,
            first_in, last_out, total_secs, status, late_secs, overtime_secs
        )
        SELECT ?, ?, identity_id, date, weekday, is_weekend,
               first_in, last_out, total_secs, status, late_secs, overtime_secs
        FROM ledger_days
        WHERE identity_id = ? AND substr(date, 1, 7) = ?
        "#,
    )
    .bind(format_timestamp(at))
    .bind(reason)
    .bind(&key.identity_id)
    .bind(month_prefix(key))
    .execute(&mut *conn)
    .await?
    .rows_affected();

    sqlx::query("DELETE FROM ledger_days WHERE identity_id = ? AND substr(date, 1, 7) = ?")
        .bind(&key.identity_id)
        .bind(month_prefix(key))
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM ledgers WHERE identity_id = ? AND year = ? AND month = ?")
        .bind(&key.identity_id)
        .bind(key.year)
        .bind(key.month)
        .execute(&mut *conn)
        .await?;

    Ok(moved)
}

/// Number of quarantined rows for an identity
pub async fn quarantined_count(pool: &SqlitePool, identity_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM quarantined_days WHERE identity_id = ?")
        .bind(identity_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Identity ids with a ledger header for the month
pub async fn identities_with_ledger(pool: &SqlitePool, year: i32, month: u32) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar(
        "SELECT identity_id FROM ledgers WHERE year = ? AND month = ? ORDER BY identity_id",
    )
    .bind(year)
    .bind(month)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Day rows with a check-in on `date`, keyed by identity id
///
/// Rows that cannot be decoded are skipped with a warning; the owning
/// ledger is dealt with the next time it is mutated.
pub async fn checked_in_on(pool: &SqlitePool, date: NaiveDate) -> Result<Vec<(String, DayRecord)>> {
    let rows = sqlx::query(&format!(
        "SELECT identity_id, {} FROM ledger_days WHERE date = ? AND first_in IS NOT NULL ORDER BY identity_id",
        DAY_COLUMNS
    ))
    .bind(format_date(date))
    .fetch_all(pool)
    .await?;

    let mut present = Vec::with_capacity(rows.len());
    for row in &rows {
        let identity_id: String = row.try_get("identity_id")?;
        match day_from_row(row) {
            Ok(day) => present.push((identity_id, day)),
            Err(reason) => warn!(identity = %identity_id, %date, "Skipping unreadable day row: {}", reason),
        }
    }
    Ok(present)
}

/// Days with a check-in across all ledgers, per identity id
pub async fn attended_days(pool: &SqlitePool) -> Result<HashMap<String, i64>> {
    let rows = sqlx::query(
        "SELECT identity_id, COUNT(*) AS days FROM ledger_days WHERE first_in IS NOT NULL GROUP BY identity_id",
    )
    .fetch_all(pool)
    .await?;

    let mut attended = HashMap::with_capacity(rows.len());
    for row in &rows {
        let identity_id: String = row.try_get("identity_id")?;
        let days: i64 = row.try_get("days")?;
        attended.insert(identity_id, days);
    }
    Ok(attended)
}
