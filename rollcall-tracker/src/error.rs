//! Error types for rollcall-tracker
//!
//! Defines tracker-specific error types using thiserror. Cooldown suppression
//! and unknown faces are not errors; they are ordinary outcomes.

use thiserror::Error;

/// Main error type for rollcall-tracker
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or query errors outside a ledger commit
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration and shared-library errors
    #[error(transparent)]
    Common(#[from] rollcall_common::Error),

    /// Stored ledger could not be read back as a valid month
    ///
    /// `quarantined_rows` is the number of day rows moved aside before the
    /// ledger was recreated from the template; zero means nothing was
    /// recovered yet and the stored rows are untouched.
    #[error("Ledger {key} is corrupt ({reason}); {quarantined_rows} day rows quarantined")]
    LedgerCorrupt {
        key: String,
        reason: String,
        quarantined_rows: u64,
    },

    /// Ledger lock could not be acquired in time; the event was not applied
    #[error("Timed out after {waited_ms} ms waiting for ledger {key}")]
    ConcurrencyTimeout { key: String, waited_ms: u64 },

    /// Ledger commit failed; nothing from the unit of work is visible
    #[error("Failed to persist ledger {key}: {source}")]
    PersistFailed {
        key: String,
        #[source]
        source: sqlx::Error,
    },

    /// Ledger rows vanished between read and write; nothing was committed
    #[error("Ledger {key} changed during the update; nothing was written")]
    LedgerConflict { key: String },

    /// Invalid request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Convenience Result type using rollcall-tracker Error
pub type Result<T> = std::result::Result<T, Error>;
