//! Boundary event types
//!
//! Types exchanged between the recognition subsystem, the tracker core and
//! whatever presents the results (LCD, web page, operator CLI).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Label the recognizer uses for faces it could not match
pub const DEFAULT_UNKNOWN_LABEL: &str = "Unknown";

/// A recognition result handed over by the face-recognition subsystem
///
/// The match/no-match decision has already been made upstream: either
/// `identity_name` is an enrolled name or it is the unknown label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionEvent {
    /// Enrolled name, or the unknown label
    pub identity_name: String,
    /// Recognizer confidence, carried through to the audit log
    pub confidence: f32,
    /// Local wall-clock time of the observation
    pub timestamp: NaiveDateTime,
}

impl RecognitionEvent {
    pub fn new(identity_name: impl Into<String>, confidence: f32, timestamp: NaiveDateTime) -> Self {
        Self {
            identity_name: identity_name.into(),
            confidence,
            timestamp,
        }
    }

    /// True when the event does not name a resolvable person
    ///
    /// Blank names and the unknown label (compared case-insensitively)
    /// are both unresolvable.
    pub fn is_unknown(&self, unknown_label: &str) -> bool {
        let name = self.identity_name.trim();
        name.is_empty() || name.eq_ignore_ascii_case(unknown_label)
    }
}

/// Classification of an admitted event against the day's record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// First arrival of the day
    CheckIn,
    /// Departure while present
    CheckOut,
    /// Arrival after a departure; cancels the prior check-out
    ReEntry,
}

impl Transition {
    /// Presence after the transition has been applied
    pub fn presence(self) -> PresenceStatus {
        match self {
            Transition::CheckIn | Transition::ReEntry => PresenceStatus::In,
            Transition::CheckOut => PresenceStatus::Out,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Transition::CheckIn => "CHECK_IN",
            Transition::CheckOut => "CHECK_OUT",
            Transition::ReEntry => "RE_ENTRY",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a person is currently inside or has left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PresenceStatus {
    In,
    Out,
}

impl PresenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PresenceStatus::In => "IN",
            PresenceStatus::Out => "OUT",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "IN" => Some(PresenceStatus::In),
            "OUT" => Some(PresenceStatus::Out),
            _ => None,
        }
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_unknown_detection() {
        assert!(RecognitionEvent::new("Unknown", 0.2, ts()).is_unknown("Unknown"));
        assert!(RecognitionEvent::new("unknown", 0.2, ts()).is_unknown("Unknown"));
        assert!(RecognitionEvent::new("   ", 0.9, ts()).is_unknown("Unknown"));
        assert!(!RecognitionEvent::new("Linh", 0.9, ts()).is_unknown("Unknown"));
    }

    #[test]
    fn test_transition_presence() {
        assert_eq!(Transition::CheckIn.presence(), PresenceStatus::In);
        assert_eq!(Transition::ReEntry.presence(), PresenceStatus::In);
        assert_eq!(Transition::CheckOut.presence(), PresenceStatus::Out);
    }

    #[test]
    fn test_presence_parse() {
        assert_eq!(PresenceStatus::parse("IN"), Some(PresenceStatus::In));
        assert_eq!(PresenceStatus::parse("OUT"), Some(PresenceStatus::Out));
        assert_eq!(PresenceStatus::parse("in"), None);
    }

    #[test]
    fn test_transition_display() {
        assert_eq!(Transition::CheckIn.to_string(), "CHECK_IN");
        assert_eq!(Transition::ReEntry.to_string(), "RE_ENTRY");
        assert_eq!(PresenceStatus::Out.to_string(), "OUT");
    }
}
