//! Append-only audit log of accepted events

use crate::error::Result;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rollcall_common::human_time::{format_clock, parse_clock};
use rollcall_common::time::{format_date, format_timestamp, parse_timestamp};
use rollcall_common::PresenceStatus;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::warn;

/// One accepted event as recorded in `status_log`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusLogEntry {
    /// Assigned by the database; `None` before insertion
    pub seq: Option<i64>,
    pub logged_at: NaiveDateTime,
    pub name: String,
    pub identity_id: String,
    pub status: PresenceStatus,
    pub check_in_time: Option<NaiveTime>,
    pub check_out_time: Option<NaiveTime>,
    pub duration_secs: Option<i64>,
    /// Recognition confidence; `None` for manual entries
    pub confidence: Option<f32>,
}

fn entry_from_row(row: &SqliteRow) -> Option<StatusLogEntry> {
    let logged_at: String = row.try_get("logged_at").ok()?;
    let status: String = row.try_get("status").ok()?;
    let clock = |column: &str| -> Option<NaiveTime> {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .and_then(|text| parse_clock(&text).ok())
    };

    Some(StatusLogEntry {
        seq: row.try_get::<i64, _>("seq").ok(),
        logged_at: parse_timestamp(&logged_at)?,
        name: row.try_get("name").ok()?,
        identity_id: row.try_get("identity_id").ok()?,
        status: PresenceStatus::parse(&status)?,
        check_in_time: clock("check_in_time"),
        check_out_time: clock("check_out_time"),
        duration_secs: row.try_get::<Option<i64>, _>("duration_secs").ok().flatten(),
        confidence: row.try_get::<Option<f32>, _>("confidence").ok().flatten(),
    })
}

fn decode_rows(rows: &[SqliteRow]) -> Vec<StatusLogEntry> {
    rows.iter()
        .filter_map(|row| {
            let entry = entry_from_row(row);
            if entry.is_none() {
                warn!("Skipping unreadable status log row");
            }
            entry
        })
        .collect()
}

/// Append an entry; returns its sequence number
pub async fn insert(conn: &mut SqliteConnection, entry: &StatusLogEntry) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO status_log (
            logged_at, name, identity_id, status,
            check_in_time, check_out_time, duration_secs, confidence
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(format_timestamp(entry.logged_at))
    .bind(&entry.name)
    .bind(&entry.identity_id)
    .bind(entry.status.as_str())
    .bind(entry.check_in_time.map(format_clock))
    .bind(entry.check_out_time.map(format_clock))
    .bind(entry.duration_secs)
    .bind(entry.confidence)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Restriction of an audit log listing; `None` leaves that side open
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    pub identity_id: Option<String>,
    /// First day included
    pub from: Option<NaiveDate>,
    /// Last day included
    pub to: Option<NaiveDate>,
}

/// Entries matching `filter` in insertion order
pub async fn list_filtered(pool: &SqlitePool, filter: &LogFilter) -> Result<Vec<StatusLogEntry>> {
    let from = filter.from.map(format_date);
    let to = filter.to.map(format_date);

    let rows = sqlx::query(
        r#"
        SELECT * FROM status_log
        WHERE (?1 IS NULL OR identity_id = ?1)
          AND (?2 IS NULL OR substr(logged_at, 1, 10) >= ?2)
          AND (?3 IS NULL OR substr(logged_at, 1, 10) <= ?3)
        ORDER BY seq
        "#,
    )
    .bind(filter.identity_id.as_deref())
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    Ok(decode_rows(&rows))
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM status_log")
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Latest accepted event per identity on `date`
pub async fn latest_on(pool: &SqlitePool, date: NaiveDate) -> Result<Vec<(String, NaiveDateTime)>> {
    let rows = sqlx::query(
        r#"
        SELECT identity_id, MAX(logged_at) AS latest
        FROM status_log
        WHERE substr(logged_at, 1, 10) = ?
        GROUP BY identity_id
        "#,
    )
    .bind(format_date(date))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let identity_id: String = row.try_get("identity_id").ok()?;
            let latest: String = row.try_get("latest").ok()?;
            Some((identity_id, parse_timestamp(&latest)?))
        })
        .collect())
}
