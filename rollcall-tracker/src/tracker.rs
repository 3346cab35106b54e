//! Attendance tracker
//!
//! Wires the pieces into the per-event pipeline:
//!
//! 1. Unknown faces and blank names are dropped without touching anything.
//! 2. The name is resolved to its identity, enrolling it if new.
//! 3. The ledger lock for the identity's month is taken.
//! 4. The cooldown gate admits or suppresses the event.
//! 5. The store classifies, applies, recomputes and commits.
//!
//! If step 5 fails the gate admission is undone, so the retried event is
//! judged as if the failed one never happened.

use crate::cooldown::{Admission, CooldownGate};
use crate::db::{init_database, status_log, status_log::StatusLogEntry};
use crate::error::{Error, Result};
use crate::guard::ConcurrencyGuard;
use crate::ledger::{Applied, LedgerKey, LedgerStore, MonthlyLedger};
use crate::registry::{Identity, IdentityRegistry};
use crate::report::{DirectoryEntry, MonthlyReportRow, PresenceEntry};
use crate::toggle::{DayState, TogglePolicy};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rollcall_common::time::{self, days_in_month};
use rollcall_common::{PresenceStatus, RecognitionEvent, TrackerConfig, Transition};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// What happened to one recognition event
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Unknown face or blank name; nothing was touched
    Ignored,
    /// Seen again inside the cooldown window; nothing was written
    Suppressed {
        identity: Identity,
        remaining: Duration,
    },
    /// Transition committed to the ledger and the audit log
    Recorded { identity: Identity, applied: Applied },
}

impl Outcome {
    pub fn transition(&self) -> Option<Transition> {
        match self {
            Outcome::Recorded { applied, .. } => Some(applied.transition),
            _ => None,
        }
    }
}

/// Result of an operator check-out
#[derive(Debug, Clone, PartialEq)]
pub enum ManualCheckout {
    CheckedOut { identity: Identity, applied: Applied },
    /// The identity was not inside; nothing was written
    NotCheckedIn { identity: Identity },
}

/// The attendance engine
#[derive(Debug)]
pub struct AttendanceTracker {
    config: TrackerConfig,
    registry: IdentityRegistry,
    gate: CooldownGate,
    guard: ConcurrencyGuard,
    store: LedgerStore,
}

impl AttendanceTracker {
    /// Open (creating if needed) the database at `db_path`
    pub async fn open(config: TrackerConfig, db_path: &Path) -> Result<Self> {
        config.validate()?;
        let pool = init_database(db_path).await?;
        Self::with_pool(config, pool).await
    }

    /// Build a tracker over an initialized pool
    pub async fn with_pool(config: TrackerConfig, pool: SqlitePool) -> Result<Self> {
        let policy = TogglePolicy::from_config(&config)?;
        let registry = IdentityRegistry::open(pool.clone()).await?;
        let gate = CooldownGate::new(config.cooldown_window());
        let guard = ConcurrencyGuard::new(config.lock_timeout());
        let store = LedgerStore::new(pool, policy);

        let tracker = Self {
            config,
            registry,
            gate,
            guard,
            store,
        };
        tracker.warm_start(time::today()).await?;
        Ok(tracker)
    }

    /// Seed the cooldown gate from the audit log of `date`
    ///
    /// A restart must not let someone who checked in seconds ago be
    /// toggled straight back out.
    pub async fn warm_start(&self, date: NaiveDate) -> Result<usize> {
        let latest = status_log::latest_on(self.store.pool(), date).await?;
        for (identity_id, at) in &latest {
            self.gate.seed(identity_id, *at);
        }
        if !latest.is_empty() {
            info!("Seeded cooldown timers for {} identities", latest.len());
        }
        Ok(latest.len())
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn guard(&self) -> &ConcurrencyGuard {
        &self.guard
    }

    /// Run one recognition event through the pipeline
    pub async fn process(&self, event: &RecognitionEvent) -> Result<Outcome> {
        if event.is_unknown(&self.config.unknown_label) {
            debug!(name = %event.identity_name, "Ignoring unrecognized face");
            return Ok(Outcome::Ignored);
        }

        // Ledgers store whole seconds; classify on what will be stored
        let at = time::whole_seconds(event.timestamp);
        let identity = self.registry.resolve(&event.identity_name, at).await?;
        let key = LedgerKey::for_date(&identity.id, at.date());

        self.guard
            .with_lock(&key, |lease| async move {
                let previous = match self.gate.admit(&identity.id, at) {
                    Admission::Allow { previous } => previous,
                    Admission::Suppress { remaining } => {
                        return Ok(Outcome::Suppressed {
                            identity,
                            remaining,
                        });
                    }
                };

                match self
                    .store
                    .apply(&lease, &identity, at, Some(event.confidence))
                    .await
                {
                    Ok(applied) => Ok(Outcome::Recorded { identity, applied }),
                    Err(e) => {
                        self.gate.rollback(&identity.id, at, previous);
                        Err(e)
                    }
                }
            })
            .await
    }

    /// Check out an identity that is inside, bypassing the cooldown gate
    pub async fn manual_checkout(&self, name: &str, at: NaiveDateTime) -> Result<ManualCheckout> {
        let at = time::whole_seconds(at);
        let identity = self.require(name).await?;
        let key = LedgerKey::for_date(&identity.id, at.date());

        let applied = self
            .guard
            .with_lock(&key, |lease| {
                let identity = &identity;
                async move {
                    self.store
                        .apply_only(&lease, identity, at, Transition::CheckOut)
                        .await
                }
            })
            .await?;

        match applied {
            Some(applied) => {
                // The departure counts as an admission for the camera too
                self.gate.seed(&identity.id, at);
                info!(name = %identity.name, "Manual check-out");
                Ok(ManualCheckout::CheckedOut { identity, applied })
            }
            None => Ok(ManualCheckout::NotCheckedIn { identity }),
        }
    }

    /// Identity by display name, falling back to its id
    async fn require(&self, name_or_id: &str) -> Result<Identity> {
        if let Some(identity) = self.registry.lookup(name_or_id).await? {
            return Ok(identity);
        }
        self.registry
            .lookup_id(name_or_id.trim())
            .await?
            .ok_or_else(|| Error::NotFound(format!("identity '{}'", name_or_id.trim())))
    }

    /// Time before `name` can be recorded again; zero for unknown names
    pub async fn cooldown_remaining(&self, name: &str, now: NaiveDateTime) -> Result<Duration> {
        Ok(match self.registry.lookup(name).await? {
            Some(identity) => self.gate.remaining(&identity.id, now),
            None => Duration::zero(),
        })
    }

    /// IN or OUT on `date`; `None` when there was no check-in
    pub async fn presence_of(&self, name: &str, date: NaiveDate) -> Result<Option<PresenceStatus>> {
        let identity = self.require(name).await?;
        let key = LedgerKey::for_date(&identity.id, date);
        let Some(ledger) = self.store.load(&key).await? else {
            return Ok(None);
        };
        Ok(ledger.day(date).and_then(|day| match DayState::of(day) {
            DayState::Absent => None,
            DayState::Present { .. } => Some(PresenceStatus::In),
            DayState::Departed { .. } => Some(PresenceStatus::Out),
        }))
    }

    /// Everyone who checked in on `date`, sorted by name
    pub async fn presence(&self, date: NaiveDate) -> Result<Vec<PresenceEntry>> {
        let names = self.names_by_id().await?;
        let mut entries: Vec<PresenceEntry> = self
            .store
            .checked_in_on(date)
            .await?
            .into_iter()
            .map(|(identity_id, day)| {
                let status = match DayState::of(&day) {
                    DayState::Departed { .. } => PresenceStatus::Out,
                    _ => PresenceStatus::In,
                };
                PresenceEntry {
                    name: names.get(&identity_id).cloned().unwrap_or_else(|| identity_id.clone()),
                    identity_id,
                    status,
                    first_in: day.first_in(),
                    last_out: day.last_out(),
                    total_secs: day.total_secs(),
                }
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// The ledger of `name` for a month; the empty template if nothing was recorded
    pub async fn ledger(&self, name: &str, year: i32, month: u32) -> Result<(Identity, MonthlyLedger)> {
        let identity = self.require(name).await?;
        let key = LedgerKey::new(identity.id.clone(), year, month);
        let ledger = self.store.ledger_or_template(&key).await?;
        Ok((identity, ledger))
    }

    /// Summary of every identity with a ledger for the month, sorted by name
    pub async fn monthly_report(&self, year: i32, month: u32) -> Result<Vec<MonthlyReportRow>> {
        if days_in_month(year, month).is_none() {
            return Err(Error::InvalidInput(format!("invalid month {}-{}", year, month)));
        }
        let names = self.names_by_id().await?;
        let mut rows: Vec<MonthlyReportRow> = self
            .store
            .ledgers_for_month(year, month)
            .await?
            .into_iter()
            .map(|ledger| MonthlyReportRow {
                name: names
                    .get(ledger.identity_id())
                    .cloned()
                    .unwrap_or_else(|| ledger.identity_id().to_string()),
                identity_id: ledger.identity_id().to_string(),
                summary: *ledger.summary(),
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    /// Every enrolled identity with its total attended days
    pub async fn directory(&self) -> Result<Vec<DirectoryEntry>> {
        let attended = self.store.attended_days().await?;
        Ok(self
            .registry
            .list()
            .await?
            .into_iter()
            .map(|identity| DirectoryEntry {
                attended_days: attended.get(&identity.id).copied().unwrap_or(0),
                identity,
            })
            .collect())
    }

    /// Audit entries logged between `from` and `to` inclusive, optionally for one name
    ///
    /// Either bound may be left open.
    pub async fn export_log(
        &self,
        name: Option<&str>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<StatusLogEntry>> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(Error::InvalidInput(format!(
                    "export range starts {} after it ends {}",
                    from, to
                )));
            }
        }
        let identity = match name {
            Some(name) => Some(self.require(name).await?),
            None => None,
        };
        let filter = status_log::LogFilter {
            identity_id: identity.map(|identity| identity.id),
            from,
            to,
        };
        status_log::list_filtered(self.store.pool(), &filter).await
    }

    async fn names_by_id(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .registry
            .list()
            .await?
            .into_iter()
            .map(|identity| (identity.id, identity.name))
            .collect())
    }
}
