//! Daily toggle state machine
//!
//! A day is `Absent` (no check-in), `Present` (checked in, not out) or
//! `Departed` (checked in and out). The state is derived from the stored
//! [`DayRecord`] every time, never tracked on the side, so a restart picks
//! up exactly where the ledger left off.
//!
//! | State    | Event classified as | Next state |
//! |----------|---------------------|------------|
//! | Absent   | CheckIn             | Present    |
//! | Present  | CheckOut            | Departed   |
//! | Departed | ReEntry             | Present    |

use crate::ledger::{DayRecord, DayStatus};
use chrono::NaiveTime;
use rollcall_common::config::{ReentryPolicy, TrackerConfig};
use rollcall_common::Transition;

/// Attendance state of one identity on one day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayState {
    Absent,
    Present { first_in: NaiveTime },
    Departed { first_in: NaiveTime, last_out: NaiveTime },
}

impl DayState {
    /// Derive the state from a day row
    pub fn of(record: &DayRecord) -> Self {
        match (record.first_in, record.last_out) {
            (None, _) => DayState::Absent,
            (Some(first_in), None) => DayState::Present { first_in },
            (Some(first_in), Some(last_out)) => DayState::Departed { first_in, last_out },
        }
    }

    /// The classification an admitted event receives in this state
    pub fn next_transition(self) -> Transition {
        match self {
            DayState::Absent => Transition::CheckIn,
            DayState::Present { .. } => Transition::CheckOut,
            DayState::Departed { .. } => Transition::ReEntry,
        }
    }
}

/// Classify an admitted event against the day's current row
pub fn classify(record: &DayRecord) -> Transition {
    DayState::of(record).next_transition()
}

/// Cutoffs and re-entry handling used when applying transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TogglePolicy {
    pub late_cutoff: NaiveTime,
    pub overtime_cutoff: NaiveTime,
    pub reentry: ReentryPolicy,
}

impl Default for TogglePolicy {
    fn default() -> Self {
        Self {
            late_cutoff: NaiveTime::from_hms_opt(8, 30, 0).unwrap_or_default(),
            overtime_cutoff: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
            reentry: ReentryPolicy::Discard,
        }
    }
}

impl TogglePolicy {
    pub fn from_config(config: &TrackerConfig) -> rollcall_common::Result<Self> {
        Ok(Self {
            late_cutoff: config.late_cutoff_time()?,
            overtime_cutoff: config.overtime_cutoff_time()?,
            reentry: config.reentry_policy,
        })
    }
}

/// Seconds from `from` to `to`, never negative
fn secs_between(from: NaiveTime, to: NaiveTime) -> i64 {
    (to - from).num_seconds().max(0)
}

/// Apply `transition` at wall-clock `at` to a day row
///
/// Only the fields owned by the transition are touched. A transition that
/// does not fit the row's current state (checking in twice, checking out
/// before any check-in) leaves the row unchanged, which makes re-applying
/// the same classification harmless. Returns whether the row changed.
pub fn apply_transition(
    record: &mut DayRecord,
    transition: Transition,
    at: NaiveTime,
    policy: &TogglePolicy,
) -> bool {
    let before = record.clone();

    match (DayState::of(record), transition) {
        (DayState::Absent, Transition::CheckIn) => {
            record.first_in = Some(at);
            record.last_out = None;
            record.total_secs = None;
            record.overtime_secs = 0;
            if at > policy.late_cutoff {
                record.status = DayStatus::Late;
                record.late_secs = secs_between(policy.late_cutoff, at);
            } else {
                record.status = DayStatus::OnTime;
                record.late_secs = 0;
            }
        }
        (
            DayState::Present { first_in } | DayState::Departed { first_in, .. },
            Transition::CheckOut,
        ) => {
            // A skewed clock may report a departure before the arrival
            let last_out = at.max(first_in);
            record.last_out = Some(last_out);
            record.total_secs = Some(secs_between(first_in, last_out));
            record.overtime_secs = secs_between(policy.overtime_cutoff, last_out);
        }
        (DayState::Departed { .. }, Transition::ReEntry) => {
            record.last_out = None;
            if policy.reentry == ReentryPolicy::Discard {
                record.total_secs = None;
                record.overtime_secs = 0;
            }
        }
        _ => {}
    }

    *record != before
}
