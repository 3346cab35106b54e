//! Ledger summary aggregation
//!
//! The summary is a pure fold over a ledger's day rows. It is recomputed in
//! full after every mutation (at most 31 rows) and never patched
//! incrementally, so it cannot drift from the rows it describes.

use super::{DayRecord, DayStatus};
use serde::{Deserialize, Serialize};

/// Whole-month statistics derived from the day rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Days with a check-in
    pub working_days: u32,
    /// Sum of completed day durations, in seconds
    pub total_worked_secs: i64,
    pub days_late: u32,
    pub total_late_secs: i64,
    pub days_overtime: u32,
    pub total_overtime_secs: i64,
}

/// Recompute the summary of a month from its day rows
pub fn recompute(days: &[DayRecord]) -> LedgerSummary {
    days.iter().fold(LedgerSummary::default(), |mut acc, day| {
        if day.first_in.is_some() {
            acc.working_days += 1;
        }
        if let Some(secs) = day.total_secs {
            acc.total_worked_secs += secs.max(0);
        }
        if day.status == DayStatus::Late {
            acc.days_late += 1;
            acc.total_late_secs += day.late_secs.max(0);
        }
        if day.overtime_secs > 0 {
            acc.days_overtime += 1;
            acc.total_overtime_secs += day.overtime_secs;
        }
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn day(d: u32) -> DayRecord {
        DayRecord::empty(NaiveDate::from_ymd_opt(2024, 12, d).unwrap())
    }

    fn hms(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn worked(d: u32, status: DayStatus, total: Option<i64>, late: i64, ot: i64) -> DayRecord {
        let mut record = day(d);
        record.first_in = Some(hms(8, 0));
        record.last_out = total.map(|_| hms(17, 0));
        record.total_secs = total;
        record.status = status;
        record.late_secs = late;
        record.overtime_secs = ot;
        record
    }

    #[test]
    fn test_empty_month() {
        let days: Vec<DayRecord> = (1..=31).map(day).collect();
        assert_eq!(recompute(&days), LedgerSummary::default());
    }

    #[test]
    fn test_mixed_month() {
        let days = vec![
            worked(2, DayStatus::OnTime, Some(33_300), 0, 1800),
            worked(3, DayStatus::Late, Some(28_800), 900, 0),
            // Still inside: counts as a working day, no duration yet
            worked(4, DayStatus::Late, None, 600, 0),
            day(5),
        ];
        let summary = recompute(&days);
        assert_eq!(summary.working_days, 3);
        assert_eq!(summary.total_worked_secs, 33_300 + 28_800);
        assert_eq!(summary.days_late, 2);
        assert_eq!(summary.total_late_secs, 1500);
        assert_eq!(summary.days_overtime, 1);
        assert_eq!(summary.total_overtime_secs, 1800);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let days = vec![
            worked(2, DayStatus::OnTime, Some(30_000), 0, 600),
            worked(9, DayStatus::Late, Some(20_000), 1200, 0),
        ];
        assert_eq!(recompute(&days), recompute(&days));
    }
}
