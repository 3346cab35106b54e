//! Database access
//!
//! SQLite holds everything durable: the identity directory, ledger headers,
//! day rows, the audit log and quarantined rows of corrupt ledgers.

pub mod identities;
pub mod init;
pub mod ledgers;
pub mod status_log;

pub use init::{create_schema, init_database};
