//! Timestamp utilities
//!
//! Attendance is kept in local wall-clock time: a check-in at 08:15 is
//! compared against an 08:30 cutoff regardless of the host's UTC offset.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike, Weekday};

/// Get current local wall-clock timestamp
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Drop the sub-second part; ledgers and the audit log keep whole seconds
pub fn whole_seconds(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp.with_nanosecond(0).unwrap_or(timestamp)
}

/// Get today's local date
pub fn today() -> NaiveDate {
    now().date()
}

/// Number of days in the given month, or `None` for an invalid month
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    u32::try_from(next.signed_duration_since(first).num_days()).ok()
}

/// Saturday and Sunday are weekend days
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Storage and display format of timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Storage format of dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format a timestamp as `YYYY-MM-DD HH:MM:SS`
pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Format a date as `YYYY-MM-DD`
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

/// Parse a `YYYY-MM` month, rejecting months outside 1..=12
pub fn parse_year_month(text: &str) -> Option<(i32, u32)> {
    let (year, month) = text.trim().split_once('-')?;
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    days_in_month(year, month)?;
    Some((year, month))
}

/// Parse a timestamp given as `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`,
/// or `YYYY-MM-DD HH:MM`
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        // After 2000-01-01, before 2100-01-01
        assert!(timestamp.and_utc().timestamp() > 946_684_800);
        assert!(timestamp.and_utc().timestamp() < 4_102_444_800);
    }

    #[test]
    fn test_whole_seconds_truncates() {
        let precise = NaiveDate::from_ymd_opt(2024, 12, 2)
            .unwrap()
            .and_hms_milli_opt(8, 30, 0, 999)
            .unwrap();
        let truncated = whole_seconds(precise);
        assert_eq!(truncated.time(), chrono::NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert_eq!(whole_seconds(truncated), truncated);
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 1), Some(31));
        assert_eq!(days_in_month(2024, 2), Some(29));
        assert_eq!(days_in_month(2023, 2), Some(28));
        assert_eq!(days_in_month(2024, 4), Some(30));
        assert_eq!(days_in_month(2024, 12), Some(31));
        assert_eq!(days_in_month(2024, 13), None);
        assert_eq!(days_in_month(2024, 0), None);
    }

    #[test]
    fn test_weekend_detection() {
        // 2024-12-07 was a Saturday
        let sat = NaiveDate::from_ymd_opt(2024, 12, 7).unwrap();
        let sun = NaiveDate::from_ymd_opt(2024, 12, 8).unwrap();
        let mon = NaiveDate::from_ymd_opt(2024, 12, 9).unwrap();
        assert!(is_weekend(sat));
        assert!(is_weekend(sun));
        assert!(!is_weekend(mon));
    }

    #[test]
    fn test_timestamp_text_round_trip() {
        let stamp = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(7, 4, 9)
            .unwrap();
        assert_eq!(format_timestamp(stamp), "2024-03-05 07:04:09");
        assert_eq!(parse_timestamp(&format_timestamp(stamp)), Some(stamp));
        assert_eq!(format_date(stamp.date()), "2024-03-05");
        assert_eq!(parse_date("2024-03-05"), Some(stamp.date()));
        assert_eq!(parse_date("2024-02-30"), None);
    }

    #[test]
    fn test_parse_year_month() {
        assert_eq!(parse_year_month("2024-12"), Some((2024, 12)));
        assert_eq!(parse_year_month(" 2025-01 "), Some((2025, 1)));
        assert_eq!(parse_year_month("2024-13"), None);
        assert_eq!(parse_year_month("2024"), None);
        assert_eq!(parse_year_month("december"), None);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 12, 2)
            .unwrap()
            .and_hms_opt(8, 15, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-12-02 08:15:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-12-02T08:15:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-12-02 08:15"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
