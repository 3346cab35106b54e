//! Identity directory persistence

use crate::error::Result;
use crate::registry::Identity;
use rollcall_common::time::{format_timestamp, parse_timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

fn identity_from_row(row: &SqliteRow) -> Result<Identity> {
    let enrolled_at: String = row.try_get("enrolled_at")?;
    Ok(Identity {
        name: row.try_get("name")?,
        id: row.try_get("identity_id")?,
        enrolled_at: parse_timestamp(&enrolled_at),
    })
}

/// Insert a mapping unless the name or the id is already taken
///
/// Returns whether a row was written.
pub async fn insert_if_free(pool: &SqlitePool, identity: &Identity) -> Result<bool> {
    let enrolled_at = identity.enrolled_at.map(format_timestamp).unwrap_or_default();
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO identities (name, identity_id, enrolled_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(&identity.name)
    .bind(&identity.id)
    .bind(enrolled_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Load the mapping for a name
pub async fn find_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Identity>> {
    let row = sqlx::query("SELECT name, identity_id, enrolled_at FROM identities WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(identity_from_row).transpose()
}

/// Load the mapping for an id
pub async fn find_by_id(pool: &SqlitePool, identity_id: &str) -> Result<Option<Identity>> {
    let row =
        sqlx::query("SELECT name, identity_id, enrolled_at FROM identities WHERE identity_id = ?")
            .bind(identity_id)
            .fetch_optional(pool)
            .await?;

    row.as_ref().map(identity_from_row).transpose()
}

/// Every enrolled identity, sorted by name
pub async fn list(pool: &SqlitePool) -> Result<Vec<Identity>> {
    let rows = sqlx::query("SELECT name, identity_id, enrolled_at FROM identities ORDER BY name")
        .fetch_all(pool)
        .await?;

    rows.iter().map(identity_from_row).collect()
}
