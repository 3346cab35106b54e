//! # Rollcall Common Library
//!
//! Shared code for the Rollcall attendance crates including:
//! - Boundary event types (recognition events, transitions, presence)
//! - Configuration loading and root folder resolution
//! - Wall-clock helpers
//! - Human-readable duration formatting ("9h 15m")

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod time;

pub use config::TrackerConfig;
pub use error::{Error, Result};
pub use events::{PresenceStatus, RecognitionEvent, Transition};
