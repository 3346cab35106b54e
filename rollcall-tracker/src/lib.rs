//! # Rollcall Tracker
//!
//! Attendance event classification and ledger engine.
//!
//! Recognition events from a face-recognition front end are gated by a
//! per-person cooldown, classified by a daily check-in/check-out toggle and
//! applied to monthly ledgers kept in SQLite, with an append-only audit log
//! of every accepted event.
//!
//! Entry point: [`AttendanceTracker`].

pub mod cooldown;
pub mod db;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod registry;
pub mod report;
pub mod toggle;
pub mod tracker;

pub use cooldown::{Admission, CooldownGate};
pub use error::{Error, Result};
pub use guard::{ConcurrencyGuard, LedgerLease};
pub use ledger::{Applied, DayRecord, DayStatus, LedgerKey, LedgerStore, LedgerSummary, MonthlyLedger};
pub use registry::{Identity, IdentityRegistry};
pub use toggle::{DayState, TogglePolicy};
pub use tracker::{AttendanceTracker, ManualCheckout, Outcome};
