//! Monthly attendance ledgers
//!
//! A ledger holds one [`DayRecord`] per calendar day of a month for one
//! identity, plus a [`LedgerSummary`] derived from those rows. Ledgers are
//! created lazily, pre-filled from the month template, and only ever
//! mutated through [`LedgerStore::apply`](store::LedgerStore::apply).

pub mod store;
pub mod summary;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use rollcall_common::time::{days_in_month, is_weekend};
use serde::{Deserialize, Serialize};

pub use store::{Applied, LedgerStore};
pub use summary::{recompute, LedgerSummary};

/// Punctuality of a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayStatus {
    NotPresent,
    OnTime,
    Late,
}

impl DayStatus {
    /// Text stored in the database and shown in the ledger table
    pub fn as_str(self) -> &'static str {
        match self {
            DayStatus::NotPresent => "NOT PRESENT",
            DayStatus::OnTime => "ON TIME",
            DayStatus::Late => "LATE",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "NOT PRESENT" => Some(DayStatus::NotPresent),
            "ON TIME" => Some(DayStatus::OnTime),
            "LATE" => Some(DayStatus::Late),
            _ => None,
        }
    }
}

impl std::fmt::Display for DayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one ledger: an identity's month
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey {
    pub identity_id: String,
    pub year: i32,
    pub month: u32,
}

impl LedgerKey {
    pub fn new(identity_id: impl Into<String>, year: i32, month: u32) -> Self {
        Self {
            identity_id: identity_id.into(),
            year,
            month,
        }
    }

    /// Key of the ledger holding `date`
    pub fn for_date(identity_id: impl Into<String>, date: NaiveDate) -> Self {
        Self::new(identity_id, date.year(), date.month())
    }

    /// True when `date` falls inside this ledger's month
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl std::fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:04}-{:02}", self.identity_id, self.year, self.month)
    }
}

/// Attendance data for one identity on one calendar date
///
/// Fields are readable by anyone but writable only inside the crate; the
/// toggle state machine and the store are the only writers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRecord {
    pub(crate) date: NaiveDate,
    pub(crate) first_in: Option<NaiveTime>,
    pub(crate) last_out: Option<NaiveTime>,
    /// Seconds between first_in and last_out; `None` while pending
    pub(crate) total_secs: Option<i64>,
    pub(crate) status: DayStatus,
    pub(crate) late_secs: i64,
    pub(crate) overtime_secs: i64,
}

impl DayRecord {
    /// Template row: nobody has shown up yet
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            first_in: None,
            last_out: None,
            total_secs: None,
            status: DayStatus::NotPresent,
            late_secs: 0,
            overtime_secs: 0,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }

    pub fn is_weekend(&self) -> bool {
        is_weekend(self.date)
    }

    pub fn first_in(&self) -> Option<NaiveTime> {
        self.first_in
    }

    pub fn last_out(&self) -> Option<NaiveTime> {
        self.last_out
    }

    pub fn total_secs(&self) -> Option<i64> {
        self.total_secs
    }

    pub fn status(&self) -> DayStatus {
        self.status
    }

    pub fn late_secs(&self) -> i64 {
        self.late_secs
    }

    pub fn overtime_secs(&self) -> i64 {
        self.overtime_secs
    }

    /// Consistency of a stored row; used when loading ledgers
    pub(crate) fn check(&self) -> Result<(), String> {
        match (self.first_in, self.last_out) {
            (None, Some(_)) => {
                return Err(format!("{}: check-out without check-in", self.date));
            }
            (Some(first_in), Some(last_out)) if last_out < first_in => {
                return Err(format!("{}: check-out before check-in", self.date));
            }
            (None, None) if self.status != DayStatus::NotPresent => {
                return Err(format!("{}: status {} without check-in", self.date, self.status));
            }
            (Some(_), _) if self.status == DayStatus::NotPresent => {
                return Err(format!("{}: check-in recorded as not present", self.date));
            }
            _ => {}
        }
        if self.total_secs.is_some_and(|secs| secs < 0)
            || self.late_secs < 0
            || self.overtime_secs < 0
        {
            return Err(format!("{}: negative duration", self.date));
        }
        Ok(())
    }
}

/// One identity's attendance for one month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyLedger {
    pub(crate) key: LedgerKey,
    pub(crate) days: Vec<DayRecord>,
    pub(crate) summary: LedgerSummary,
}

impl MonthlyLedger {
    /// Fresh ledger with an empty row for every day of the month
    pub fn template(key: LedgerKey) -> Option<Self> {
        let day_count = days_in_month(key.year, key.month)?;
        let days = (1..=day_count)
            .map(|day| NaiveDate::from_ymd_opt(key.year, key.month, day).map(DayRecord::empty))
            .collect::<Option<Vec<_>>>()?;
        let summary = recompute(&days);
        Some(Self { key, days, summary })
    }

    /// Assemble a ledger from stored rows, checking it is a complete month
    pub(crate) fn from_rows(key: LedgerKey, days: Vec<DayRecord>) -> Result<Self, String> {
        let expected = days_in_month(key.year, key.month)
            .ok_or_else(|| format!("invalid month {}-{}", key.year, key.month))?;
        if days.len() != expected as usize {
            return Err(format!("expected {} days, found {}", expected, days.len()));
        }
        for (index, day) in days.iter().enumerate() {
            if !key.contains(day.date) || day.date.day() as usize != index + 1 {
                return Err(format!("day row {} is out of sequence", day.date));
            }
            day.check()?;
        }
        let summary = recompute(&days);
        Ok(Self { key, days, summary })
    }

    pub fn key(&self) -> &LedgerKey {
        &self.key
    }

    pub fn identity_id(&self) -> &str {
        &self.key.identity_id
    }

    pub fn year(&self) -> i32 {
        self.key.year
    }

    pub fn month(&self) -> u32 {
        self.key.month
    }

    pub fn days(&self) -> &[DayRecord] {
        &self.days
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DayRecord> {
        self.index_of(date).map(|i| &self.days[i])
    }

    pub fn summary(&self) -> &LedgerSummary {
        &self.summary
    }

    pub(crate) fn day_mut(&mut self, date: NaiveDate) -> Option<&mut DayRecord> {
        self.index_of(date).map(move |i| &mut self.days[i])
    }

    /// Bring the summary back in line with the rows after a mutation
    pub(crate) fn refresh_summary(&mut self) {
        self.summary = recompute(&self.days);
    }

    fn index_of(&self, date: NaiveDate) -> Option<usize> {
        if !self.key.contains(date) {
            return None;
        }
        let index = date.day() as usize - 1;
        (index < self.days.len()).then_some(index)
    }
}
