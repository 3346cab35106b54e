//! Monthly ledger store
//!
//! The single mutation entry point for ledgers. [`LedgerStore::apply`]
//! reads the ledger, classifies the event with the toggle state machine,
//! mutates a copy, recomputes the summary and commits the day row, the
//! ledger header and the audit entry in one transaction. Nothing is
//! visible to readers until that commit succeeds; if it fails the stored
//! ledger is exactly what it was before.
//!
//! Reads happen outside the transaction. The caller's [`LedgerLease`]
//! guarantees no other writer touches the same ledger in between, and a
//! transaction whose first statement is a write waits on the busy timeout
//! instead of failing on a stale read snapshot.

use super::{DayRecord, LedgerKey, LedgerSummary, MonthlyLedger};
use crate::db::ledgers::{self, StoredLedger};
use crate::db::status_log::{self, StatusLogEntry};
use crate::error::{Error, Result};
use crate::guard::LedgerLease;
use crate::registry::Identity;
use crate::toggle::{apply_transition, classify, TogglePolicy};
use chrono::{NaiveDate, NaiveDateTime};
use rollcall_common::time;
use rollcall_common::Transition;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Result of a committed mutation
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub transition: Transition,
    /// Day row after the mutation
    pub record: DayRecord,
    /// Ledger summary after the mutation
    pub summary: LedgerSummary,
    /// Whether the day row differs from before
    pub changed: bool,
    /// Whether this mutation created the ledger
    pub created: bool,
    /// Audit entry written alongside, with its sequence number
    pub log_entry: StatusLogEntry,
}

/// Owner of every ledger in the database
#[derive(Debug, Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
    policy: TogglePolicy,
}

impl LedgerStore {
    pub fn new(pool: SqlitePool, policy: TogglePolicy) -> Self {
        Self { pool, policy }
    }

    pub fn policy(&self) -> &TogglePolicy {
        &self.policy
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Read a ledger without changing anything
    ///
    /// A corrupt ledger is reported with `quarantined_rows: 0`; its rows
    /// stay in place until the next mutation recovers it.
    pub async fn load(&self, key: &LedgerKey) -> Result<Option<MonthlyLedger>> {
        let mut conn = self.pool.acquire().await?;
        match ledgers::load(&mut conn, key).await? {
            StoredLedger::Absent => Ok(None),
            StoredLedger::Valid(ledger) => Ok(Some(ledger)),
            StoredLedger::Corrupt { reason } => Err(Error::LedgerCorrupt {
                key: key.to_string(),
                reason,
                quarantined_rows: 0,
            }),
        }
    }

    /// The stored ledger, or the empty template if none exists yet
    pub async fn ledger_or_template(&self, key: &LedgerKey) -> Result<MonthlyLedger> {
        match self.load(key).await? {
            Some(ledger) => Ok(ledger),
            None => template(key),
        }
    }

    /// Apply an admitted event to the identity's ledger
    ///
    /// The event is classified from the day's current row: check-in when
    /// absent, check-out when present, re-entry when departed.
    pub async fn apply(
        &self,
        lease: &LedgerLease,
        identity: &Identity,
        at: NaiveDateTime,
        confidence: Option<f32>,
    ) -> Result<Applied> {
        match self.mutate(lease, identity, at, confidence, None).await? {
            Some(applied) => Ok(applied),
            // Unreachable without a required transition
            None => Err(Error::InvalidInput(format!(
                "event for {} at {} was not applied",
                identity.id, at
            ))),
        }
    }

    /// Apply `transition` only if the day's state calls for it
    ///
    /// Returns `None`, with nothing written, when the day classifies as
    /// something else (a manual check-out for someone who is not in).
    pub async fn apply_only(
        &self,
        lease: &LedgerLease,
        identity: &Identity,
        at: NaiveDateTime,
        transition: Transition,
    ) -> Result<Option<Applied>> {
        self.mutate(lease, identity, at, None, Some(transition)).await
    }

    async fn mutate(
        &self,
        lease: &LedgerLease,
        identity: &Identity,
        at: NaiveDateTime,
        confidence: Option<f32>,
        required: Option<Transition>,
    ) -> Result<Option<Applied>> {
        let key = LedgerKey::for_date(&identity.id, at.date());
        if lease.key() != &key {
            return Err(Error::InvalidInput(format!(
                "lease held for ledger {}, event belongs to {}",
                lease.key(),
                key
            )));
        }

        let stored = {
            let mut conn = self.pool.acquire().await?;
            ledgers::load(&mut conn, &key).await?
        };
        let (ledger, created) = match stored {
            StoredLedger::Absent => (template(&key)?, true),
            StoredLedger::Valid(ledger) => (ledger, false),
            StoredLedger::Corrupt { reason } => return Err(self.recover(lease, reason).await),
        };

        let date = at.date();
        let before = ledger
            .day(date)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("day {} in ledger {}", date, key)))?;

        let transition = classify(&before);
        if required.is_some_and(|required| required != transition) {
            debug!(ledger = %key, %transition, "Day state does not allow requested transition");
            return Ok(None);
        }

        let mut next = ledger;
        let changed = match next.day_mut(date) {
            Some(day) => apply_transition(day, transition, at.time(), &self.policy),
            None => false,
        };
        next.refresh_summary();

        let record = next
            .day(date)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("day {} in ledger {}", date, key)))?;
        let mut log_entry = StatusLogEntry {
            seq: None,
            logged_at: at,
            name: identity.name.clone(),
            identity_id: identity.id.clone(),
            status: transition.presence(),
            check_in_time: record.first_in(),
            check_out_time: record.last_out(),
            duration_secs: record.total_secs(),
            confidence,
        };

        let seq = self
            .commit(&next, created.then_some(&next), &record, &log_entry)
            .await
            .map_err(|e| persist_error(&key, e))?;
        log_entry.seq = Some(seq);

        info!(
            ledger = %key,
            name = %identity.name,
            %transition,
            %date,
            "Recorded {}",
            transition
        );

        Ok(Some(Applied {
            transition,
            record,
            summary: *next.summary(),
            changed,
            created,
            log_entry,
        }))
    }

    /// Write one mutation atomically; any error leaves the database untouched
    async fn commit(
        &self,
        ledger: &MonthlyLedger,
        new_ledger: Option<&MonthlyLedger>,
        record: &DayRecord,
        log_entry: &StatusLogEntry,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        write_mutation(&mut tx, ledger, new_ledger, record, log_entry).await?;
        let seq = status_log::insert(&mut tx, log_entry).await?;

        tx.commit().await?;
        Ok(seq)
    }

    /// Quarantine a corrupt ledger and recreate it from the template
    ///
    /// Always returns the error to surface: `LedgerCorrupt` carrying the
    /// number of rows moved aside, or the reason the recovery itself could
    /// not be committed.
    async fn recover(&self, lease: &LedgerLease, reason: String) -> Error {
        let key = lease.key().clone();

        match self.replace_with_template(&key, &reason).await {
            Ok(quarantined_rows) => {
                warn!(
                    ledger = %key,
                    quarantined_rows,
                    "Corrupt ledger quarantined and recreated: {}",
                    reason
                );
                Error::LedgerCorrupt {
                    key: key.to_string(),
                    reason,
                    quarantined_rows,
                }
            }
            Err(e) => {
                error!(ledger = %key, "Failed to recover corrupt ledger");
                persist_error(&key, e)
            }
        }
    }

    async fn replace_with_template(
        &self,
        key: &LedgerKey,
        reason: &str,
    ) -> Result<u64> {
        let fresh = template(key)?;
        let now = time::now();

        let mut tx = self.pool.begin().await?;
        let moved = ledgers::quarantine(&mut tx, key, reason, now).await?;
        ledgers::insert_ledger(&mut tx, &fresh, now).await?;
        tx.commit().await?;

        Ok(moved)
    }

    /// Every readable ledger for the month; corrupt ones are skipped with a warning
    pub async fn ledgers_for_month(&self, year: i32, month: u32) -> Result<Vec<MonthlyLedger>> {
        let ids = ledgers::identities_with_ledger(&self.pool, year, month).await?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            let key = LedgerKey::new(id, year, month);
            match self.load(&key).await {
                Ok(Some(ledger)) => found.push(ledger),
                Ok(None) => {}
                Err(Error::LedgerCorrupt { reason, .. }) => {
                    warn!(ledger = %key, "Skipping corrupt ledger: {}", reason);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }

    /// Day rows with a check-in on `date`, keyed by identity id
    pub async fn checked_in_on(&self, date: NaiveDate) -> Result<Vec<(String, DayRecord)>> {
        ledgers::checked_in_on(&self.pool, date).await
    }

    /// Days with a check-in across all ledgers, per identity id
    pub async fn attended_days(&self) -> Result<HashMap<String, i64>> {
        ledgers::attended_days(&self.pool).await
    }
}

fn template(key: &LedgerKey) -> Result<MonthlyLedger> {
    MonthlyLedger::template(key.clone())
        .ok_or_else(|| Error::InvalidInput(format!("invalid ledger month {}", key)))
}

/// Database failures inside a commit become `PersistFailed`; others pass through
fn persist_error(key: &LedgerKey, err: Error) -> Error {
    match err {
        Error::Database(source) => {
            error!(ledger = %key, "Failed to persist ledger: {}", source);
            Error::PersistFailed {
                key: key.to_string(),
                source,
            }
        }
        other => {
            error!(ledger = %key, "Ledger commit abandoned: {}", other);
            other
        }
    }
}

async fn write_mutation(
    conn: &mut SqliteConnection,
    ledger: &MonthlyLedger,
    new_ledger: Option<&MonthlyLedger>,
    record: &DayRecord,
    log_entry: &StatusLogEntry,
) -> Result<()> {
    if let Some(new_ledger) = new_ledger {
        return ledgers::insert_ledger(conn, new_ledger, log_entry.logged_at).await;
    }

    let key = ledger.key();
    let days = ledgers::update_day(conn, &key.identity_id, record).await?;
    let headers = ledgers::update_summary(conn, key, ledger.summary(), log_entry.logged_at).await?;
    if days != 1 || headers != 1 {
        return Err(Error::LedgerConflict {
            key: key.to_string(),
        });
    }
    Ok(())
}
