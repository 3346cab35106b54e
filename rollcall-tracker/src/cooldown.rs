//! Cooldown gate
//!
//! Suppresses repeated recognitions of the same person within a window.
//! A face stays in front of the camera for several frames; without the gate
//! every frame would toggle the person in and out.
//!
//! The stored last-admitted time only moves forward. An out-of-order event
//! (clock skew) is measured by its distance to the stored time in either
//! direction and, if admitted, leaves the stored time where it was.

use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Gate decision for one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Event may proceed; `previous` is the last-admitted time it replaced,
    /// needed to undo the admission if the unit of work fails
    Allow { previous: Option<NaiveDateTime> },
    /// Event falls inside the window of an earlier admission
    Suppress { remaining: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allow { .. })
    }
}

/// Per-identity cooldown timers
#[derive(Debug)]
pub struct CooldownGate {
    window: Duration,
    last_admitted: Mutex<HashMap<String, NaiveDateTime>>,
}

fn distance(a: NaiveDateTime, b: NaiveDateTime) -> Duration {
    if a >= b {
        a - b
    } else {
        b - a
    }
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_admitted: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<String, NaiveDateTime>> {
        // The map holds plain timestamps; a panic elsewhere cannot leave it half-updated
        self.last_admitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Decide whether an event for `identity` at `at` may proceed
    ///
    /// Check and update happen under one lock, so two concurrent events for
    /// the same identity can never both be admitted inside the window.
    pub fn admit(&self, identity: &str, at: NaiveDateTime) -> Admission {
        let mut timers = self.timers();
        match timers.get(identity).copied() {
            Some(last) => {
                let gap = distance(at, last);
                if gap < self.window {
                    let remaining = self.window - gap;
                    debug!(
                        identity,
                        remaining_secs = remaining.num_seconds(),
                        "Cooldown suppressed event"
                    );
                    return Admission::Suppress { remaining };
                }
                if at > last {
                    timers.insert(identity.to_string(), at);
                }
                Admission::Allow {
                    previous: Some(last),
                }
            }
            None => {
                timers.insert(identity.to_string(), at);
                Admission::Allow { previous: None }
            }
        }
    }

    /// Undo an admission whose unit of work failed
    ///
    /// Only reverts if the stored time is still the one this admission wrote.
    pub fn rollback(&self, identity: &str, at: NaiveDateTime, previous: Option<NaiveDateTime>) {
        let mut timers = self.timers();
        if timers.get(identity) != Some(&at) {
            return;
        }
        match previous {
            Some(previous) => {
                timers.insert(identity.to_string(), previous);
            }
            None => {
                timers.remove(identity);
            }
        }
    }

    /// Time left before `identity` can be admitted again; zero if not cooling down
    pub fn remaining(&self, identity: &str, now: NaiveDateTime) -> Duration {
        match self.timers().get(identity) {
            Some(&last) => {
                let gap = distance(now, last);
                if gap < self.window {
                    self.window - gap
                } else {
                    Duration::zero()
                }
            }
            None => Duration::zero(),
        }
    }

    /// Record an admission that happened before this process started
    pub fn seed(&self, identity: &str, at: NaiveDateTime) {
        let mut timers = self.timers();
        let entry = timers.entry(identity.to_string()).or_insert(at);
        if at > *entry {
            *entry = at;
        }
    }

    /// Last admitted time for `identity`
    pub fn last_admitted(&self, identity: &str) -> Option<NaiveDateTime> {
        self.timers().get(identity).copied()
    }
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new(Duration::seconds(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 2)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_first_event_allowed() {
        let gate = CooldownGate::default();
        assert_eq!(gate.admit("USR1", at(8, 0, 0)), Admission::Allow { previous: None });
        assert_eq!(gate.last_admitted("USR1"), Some(at(8, 0, 0)));
    }

    #[test]
    fn test_event_inside_window_suppressed() {
        let gate = CooldownGate::default();
        gate.admit("USR1", at(8, 0, 0));
        assert_eq!(
            gate.admit("USR1", at(8, 4, 0)),
            Admission::Suppress {
                remaining: Duration::seconds(60)
            }
        );
        // Suppression does not extend the window
        assert_eq!(gate.last_admitted("USR1"), Some(at(8, 0, 0)));
    }

    #[test]
    fn test_event_at_window_edge_allowed() {
        let gate = CooldownGate::default();
        gate.admit("USR1", at(8, 0, 0));
        assert_eq!(
            gate.admit("USR1", at(8, 5, 0)),
            Admission::Allow {
                previous: Some(at(8, 0, 0))
            }
        );
        assert_eq!(gate.last_admitted("USR1"), Some(at(8, 5, 0)));
    }

    #[test]
    fn test_identities_are_independent() {
        let gate = CooldownGate::default();
        assert!(gate.admit("USR1", at(8, 0, 0)).is_allowed());
        assert!(gate.admit("USR2", at(8, 0, 1)).is_allowed());
    }

    #[test]
    fn test_skewed_event_never_moves_timer_back() {
        let gate = CooldownGate::default();
        gate.admit("USR1", at(12, 0, 0));

        // Slightly earlier: inside the window, suppressed
        assert!(!gate.admit("USR1", at(11, 58, 0)).is_allowed());

        // Much earlier: admitted, but the stored time stays at noon
        assert!(gate.admit("USR1", at(9, 0, 0)).is_allowed());
        assert_eq!(gate.last_admitted("USR1"), Some(at(12, 0, 0)));
    }

    #[test]
    fn test_rollback_restores_previous() {
        let gate = CooldownGate::default();
        gate.admit("USR1", at(8, 0, 0));
        let admission = gate.admit("USR1", at(9, 0, 0));
        let Admission::Allow { previous } = admission else {
            panic!("expected admission");
        };
        gate.rollback("USR1", at(9, 0, 0), previous);
        assert_eq!(gate.last_admitted("USR1"), Some(at(8, 0, 0)));

        let Admission::Allow { previous } = gate.admit("USR2", at(9, 0, 0)) else {
            panic!("expected admission");
        };
        gate.rollback("USR2", at(9, 0, 0), previous);
        assert_eq!(gate.last_admitted("USR2"), None);
    }

    #[test]
    fn test_rollback_ignores_superseded_admission() {
        let gate = CooldownGate::default();
        gate.admit("USR1", at(8, 0, 0));
        gate.seed("USR1", at(10, 0, 0));
        gate.rollback("USR1", at(8, 0, 0), None);
        assert_eq!(gate.last_admitted("USR1"), Some(at(10, 0, 0)));
    }

    #[test]
    fn test_remaining() {
        let gate = CooldownGate::default();
        assert_eq!(gate.remaining("USR1", at(8, 0, 0)), Duration::zero());
        gate.admit("USR1", at(8, 0, 0));
        assert_eq!(gate.remaining("USR1", at(8, 1, 30)), Duration::seconds(210));
        assert_eq!(gate.remaining("USR1", at(8, 30, 0)), Duration::zero());
    }

    #[test]
    fn test_seed_keeps_latest() {
        let gate = CooldownGate::default();
        gate.seed("USR1", at(9, 0, 0));
        gate.seed("USR1", at(8, 0, 0));
        assert_eq!(gate.last_admitted("USR1"), Some(at(9, 0, 0)));
        assert!(!gate.admit("USR1", at(9, 2, 0)).is_allowed());
    }
}
