//! Read-side views and their plain-text rendering
//!
//! Everything here is derived from ledgers and the audit log; nothing in
//! this module writes.

use crate::db::status_log::StatusLogEntry;
use crate::ledger::{LedgerSummary, MonthlyLedger};
use crate::registry::Identity;
use chrono::NaiveTime;
use rollcall_common::human_time::{format_clock, format_hm, format_hm_opt};
use rollcall_common::time::format_timestamp;
use rollcall_common::PresenceStatus;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Header of the audit log export
pub const STATUS_LOG_CSV_HEADER: &str =
    "Timestamp,Name,ID,Status,Check_In_Time,Check_Out_Time,Duration";

/// Who is in or out on a given day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub name: String,
    pub identity_id: String,
    pub status: PresenceStatus,
    pub first_in: Option<NaiveTime>,
    pub last_out: Option<NaiveTime>,
    pub total_secs: Option<i64>,
}

/// One line of the monthly report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyReportRow {
    pub name: String,
    pub identity_id: String,
    pub summary: LedgerSummary,
}

/// An enrolled identity with its attendance count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub identity: Identity,
    /// Days with a check-in across every ledger
    pub attended_days: i64,
}

fn clock_cell(time: Option<NaiveTime>) -> String {
    time.map(format_clock).unwrap_or_else(|| "-".to_string())
}

fn nonzero_hm(secs: i64) -> String {
    if secs > 0 {
        format_hm(secs)
    } else {
        "-".to_string()
    }
}

/// Render a ledger as a table followed by its summary block
///
/// Weekend rows carry a trailing `weekend` marker.
pub fn render_ledger(identity: &Identity, ledger: &MonthlyLedger) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Attendance {:04}-{:02}: {} ({})",
        ledger.year(),
        ledger.month(),
        identity.name,
        identity.id
    );
    let _ = writeln!(
        out,
        "{:<10} | {:<3} | {:<8} | {:<8} | {:<11} | {:<11} | {:<7} | {:<7}",
        "Date", "Day", "First In", "Last Out", "Total Hours", "Status", "Late", "OT"
    );
    for day in ledger.days() {
        let total = match day.total_secs() {
            Some(secs) => format_hm(secs),
            None => "-".to_string(),
        };
        let line = format!(
            "{:<10} | {:<3} | {:<8} | {:<8} | {:<11} | {:<11} | {:<7} | {:<7}",
            day.date().format("%Y-%m-%d"),
            day.date().format("%a"),
            clock_cell(day.first_in()),
            clock_cell(day.last_out()),
            total,
            day.status().as_str(),
            nonzero_hm(day.late_secs()),
            nonzero_hm(day.overtime_secs()),
        );
        if day.is_weekend() {
            let _ = writeln!(out, "{} weekend", line);
        } else {
            let _ = writeln!(out, "{}", line.trim_end());
        }
    }

    let summary = ledger.summary();
    let _ = writeln!(out);
    let _ = writeln!(out, "Total Working Days: {}", summary.working_days);
    let _ = writeln!(out, "Total Hours Worked: {}", format_hm(summary.total_worked_secs));
    let _ = writeln!(out, "Days Late: {}", summary.days_late);
    let _ = writeln!(out, "Total Late Time: {}", format_hm(summary.total_late_secs));
    let _ = writeln!(out, "Days with OT: {}", summary.days_overtime);
    let _ = writeln!(out, "Total OT: {}", format_hm(summary.total_overtime_secs));
    out
}

/// Render the monthly report table
pub fn render_monthly_report(year: i32, month: u32, rows: &[MonthlyReportRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Monthly report {:04}-{:02}", year, month);
    let _ = writeln!(
        out,
        "{:<20} | {:<12} | {:>9} | {:>7} | {:>10} | {:>8} | {:>12} | {:>11}",
        "Name", "ID", "Days Late", "OT Days", "Total Late", "Total OT", "Working Days", "Total Hours"
    );
    for row in rows {
        let s = &row.summary;
        let _ = writeln!(
            out,
            "{:<20} | {:<12} | {:>9} | {:>7} | {:>10} | {:>8} | {:>12} | {:>11}",
            row.name,
            row.identity_id,
            s.days_late,
            s.days_overtime,
            format_hm(s.total_late_secs),
            format_hm(s.total_overtime_secs),
            s.working_days,
            format_hm(s.total_worked_secs),
        );
    }
    if rows.is_empty() {
        let _ = writeln!(out, "(no attendance recorded)");
    }
    out
}

/// Render the presence board
pub fn render_presence(entries: &[PresenceEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "{:<20} {:<12} {:<3} in {} out {} {}",
            entry.name,
            entry.identity_id,
            entry.status.as_str(),
            clock_cell(entry.first_in),
            clock_cell(entry.last_out),
            format_hm_opt(entry.total_secs),
        );
    }
    if entries.is_empty() {
        let _ = writeln!(out, "Nobody has checked in");
    }
    out
}

/// Render the identity directory
pub fn render_directory(entries: &[DirectoryEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<20} | {:<12} | {:<19} | {:>4}", "Name", "ID", "Enrolled", "Days");
    for entry in entries {
        let enrolled = entry
            .identity
            .enrolled_at
            .map(format_timestamp)
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{:<20} | {:<12} | {:<19} | {:>4}",
            entry.identity.name, entry.identity.id, enrolled, entry.attended_days
        );
    }
    out
}

/// Quote a CSV field if it contains a separator, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Export the audit log as CSV with a header line
pub fn status_log_csv(entries: &[StatusLogEntry]) -> String {
    let mut out = String::with_capacity(64 * (entries.len() + 1));
    let _ = writeln!(out, "{}", STATUS_LOG_CSV_HEADER);
    for entry in entries {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{}",
            format_timestamp(entry.logged_at),
            csv_field(&entry.name),
            csv_field(&entry.identity_id),
            entry.status.as_str(),
            entry.check_in_time.map(format_clock).unwrap_or_default(),
            entry.check_out_time.map(format_clock).unwrap_or_default(),
            format_hm_opt(entry.duration_secs),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerKey;
    use crate::toggle::{apply_transition, TogglePolicy};
    use chrono::NaiveDate;
    use rollcall_common::Transition;

    fn identity() -> Identity {
        Identity {
            name: "Alice".to_string(),
            id: "USR3BC51062".to_string(),
            enrolled_at: None,
        }
    }

    fn hms(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn sample_ledger() -> MonthlyLedger {
        let mut ledger = MonthlyLedger::template(LedgerKey::new("USR3BC51062", 2024, 12)).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 12, 2).unwrap();
        let policy = TogglePolicy::default();
        let day = ledger.day_mut(date).unwrap();
        apply_transition(day, Transition::CheckIn, hms(8, 45), &policy);
        apply_transition(day, Transition::CheckOut, hms(17, 30), &policy);
        ledger.refresh_summary();
        ledger
    }

    #[test]
    fn test_render_ledger_rows_and_summary() {
        let text = render_ledger(&identity(), &sample_ledger());
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].contains("2024-12"));
        assert!(lines[1].starts_with("Date"));
        // Header, title, 31 days, blank line, 6 summary lines
        assert_eq!(lines.len(), 2 + 31 + 1 + 6);

        let sunday = lines[2];
        assert!(sunday.starts_with("2024-12-01 | Sun"));
        assert!(sunday.ends_with("weekend"));

        let monday = lines[3];
        assert!(monday.contains("08:45:00"));
        assert!(monday.contains("17:30:00"));
        assert!(monday.contains("8h 45m"));
        assert!(monday.contains("LATE"));
        assert!(monday.contains("15m"));
        assert!(monday.contains("30m"));
        assert!(!monday.ends_with("weekend"));

        assert!(text.contains("Total Working Days: 1"));
        assert!(text.contains("Total Hours Worked: 8h 45m"));
        assert!(text.contains("Days Late: 1"));
        assert!(text.contains("Total Late Time: 15m"));
        assert!(text.contains("Days with OT: 1"));
        assert!(text.contains("Total OT: 30m"));
    }

    #[test]
    fn test_status_log_csv() {
        let logged_at = NaiveDate::from_ymd_opt(2024, 12, 2)
            .unwrap()
            .and_hms_opt(17, 30, 0)
            .unwrap();
        let entries = vec![
            StatusLogEntry {
                seq: Some(1),
                logged_at,
                name: "Smith, Jo".to_string(),
                identity_id: "USR00000001".to_string(),
                status: PresenceStatus::Out,
                check_in_time: Some(hms(8, 15)),
                check_out_time: Some(hms(17, 30)),
                duration_secs: Some(33_300),
                confidence: Some(0.82),
            },
            StatusLogEntry {
                seq: Some(2),
                logged_at,
                name: "Bob".to_string(),
                identity_id: "USR00000002".to_string(),
                status: PresenceStatus::In,
                check_in_time: Some(hms(17, 30)),
                check_out_time: None,
                duration_secs: None,
                confidence: None,
            },
        ];

        let csv = status_log_csv(&entries);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], STATUS_LOG_CSV_HEADER);
        assert_eq!(
            lines[1],
            "2024-12-02 17:30:00,\"Smith, Jo\",USR00000001,OUT,08:15:00,17:30:00,9h 15m"
        );
        assert_eq!(lines[2], "2024-12-02 17:30:00,Bob,USR00000002,IN,17:30:00,,");
    }

    #[test]
    fn test_render_monthly_report_empty() {
        let text = render_monthly_report(2024, 12, &[]);
        assert!(text.contains("Monthly report 2024-12"));
        assert!(text.contains("no attendance recorded"));
    }
}
