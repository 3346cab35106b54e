//! Human-readable time formatting
//!
//! Provides consistent duration and clock display across the ledger table,
//! the monthly report and the audit log export.
//!
//! Durations are shown the way attendance sheets show them:
//! - `Xh Ym` when at least one hour
//! - `Ym` below one hour
//! - `0m` for zero
//!
//! Seconds are truncated, never rounded up (a 59 second stay is `0m`).

use crate::{Error, Result};
use chrono::NaiveTime;

const SECS_PER_MINUTE: i64 = 60;
const SECS_PER_HOUR: i64 = 3600;

/// Format a duration in seconds as `Xh Ym`.
///
/// Negative values are clamped to zero; derived attendance durations are
/// never allowed to go below zero.
///
/// # Examples
///
/// ```
/// use rollcall_common::human_time::format_hm;
///
/// assert_eq!(format_hm(0), "0m");
/// assert_eq!(format_hm(900), "15m");
/// assert_eq!(format_hm(33_300), "9h 15m");
/// ```
pub fn format_hm(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / SECS_PER_HOUR;
    let minutes = (seconds % SECS_PER_HOUR) / SECS_PER_MINUTE;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Format an optional duration, using an empty string for `None`.
///
/// Used for table cells where a pending value must render blank rather
/// than as `0m`.
pub fn format_hm_opt(seconds_opt: Option<i64>) -> String {
    match seconds_opt {
        Some(seconds) => format_hm(seconds),
        None => String::new(),
    }
}

/// Format a wall-clock time as `HH:MM:SS`
pub fn format_clock(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

/// Parse a wall-clock time given as `HH:MM` or `HH:MM:SS`
pub fn parse_clock(text: &str) -> Result<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .map_err(|e| Error::Parse(format!("invalid clock time '{}': {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minutes_only() {
        assert_eq!(format_hm(0), "0m");
        assert_eq!(format_hm(59), "0m");
        assert_eq!(format_hm(60), "1m");
        assert_eq!(format_hm(900), "15m");
        assert_eq!(format_hm(3599), "59m");
    }

    #[test]
    fn test_hours_and_minutes() {
        assert_eq!(format_hm(3600), "1h 0m");
        assert_eq!(format_hm(5400), "1h 30m");
        assert_eq!(format_hm(33_300), "9h 15m");
        assert_eq!(format_hm(200 * 3600), "200h 0m");
    }

    #[test]
    fn test_negative_clamped() {
        assert_eq!(format_hm(-120), "0m");
    }

    #[test]
    fn test_option_handling() {
        assert_eq!(format_hm_opt(Some(1800)), "30m");
        assert_eq!(format_hm_opt(None), "");
    }

    #[test]
    fn test_clock_parsing() {
        assert_eq!(
            parse_clock("08:30").unwrap(),
            NaiveTime::from_hms_opt(8, 30, 0).unwrap()
        );
        assert_eq!(
            parse_clock("17:00:15").unwrap(),
            NaiveTime::from_hms_opt(17, 0, 15).unwrap()
        );
        assert!(parse_clock("25:00").is_err());
        assert!(parse_clock("eight").is_err());
    }

    #[test]
    fn test_clock_format() {
        let t = NaiveTime::from_hms_opt(7, 5, 9).unwrap();
        assert_eq!(format_clock(t), "07:05:09");
    }
}
