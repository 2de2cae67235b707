//! Trial subscription state machine.
//!
//! ```text
//! CREATED ──► ACTIVE ──► ENDING_SOON ──► CONVERTED
//!               │             ├────────► EXPIRED
//!               └─────────────┴────────► CANCELED
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{StateMachine, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialState {
    /// Subscription exists; the trial has not been confirmed yet.
    Created,

    /// Trial running.
    Active,

    /// The gateway signalled the trial window is about to close.
    EndingSoon,

    /// First post-trial invoice paid.
    Converted,

    /// Trial window closed without payment.
    Expired,

    /// Explicitly canceled.
    Canceled,
}

impl TrialState {
    pub const ALL: [TrialState; 6] = [
        TrialState::Created,
        TrialState::Active,
        TrialState::EndingSoon,
        TrialState::Converted,
        TrialState::Expired,
        TrialState::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrialState::Created => "created",
            TrialState::Active => "active",
            TrialState::EndingSoon => "ending_soon",
            TrialState::Converted => "converted",
            TrialState::Expired => "expired",
            TrialState::Canceled => "canceled",
        }
    }

    /// Position along the lifecycle; transitions never decrease it.
    pub fn rank(&self) -> u8 {
        match self {
            TrialState::Created => 0,
            TrialState::Active => 1,
            TrialState::EndingSoon => 2,
            TrialState::Converted | TrialState::Expired | TrialState::Canceled => 3,
        }
    }
}

impl StateMachine for TrialState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use TrialState::*;
        matches!(
            (self, target),
            (Created, Active)
                | (Active, EndingSoon)
                | (Active, Canceled)
                | (EndingSoon, Converted)
                | (EndingSoon, Expired)
                | (EndingSoon, Canceled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use TrialState::*;
        match self {
            Created => vec![Active],
            Active => vec![EndingSoon, Canceled],
            EndingSoon => vec![Converted, Expired, Canceled],
            Converted | Expired | Canceled => vec![],
        }
    }
}

impl fmt::Display for TrialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrialState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrialState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| {
                ValidationError::invalid_format("trial_state", format!("unknown state '{}'", s))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ══════════════════════════════════════════════════════════════
    // Valid Transitions
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn created_can_only_activate() {
        assert_eq!(TrialState::Created.valid_transitions(), vec![TrialState::Active]);
        assert!(!TrialState::Created.can_transition_to(&TrialState::Canceled));
    }

    #[test]
    fn active_can_end_soon_or_cancel() {
        assert!(TrialState::Active.can_transition_to(&TrialState::EndingSoon));
        assert!(TrialState::Active.can_transition_to(&TrialState::Canceled));
        assert!(!TrialState::Active.can_transition_to(&TrialState::Converted));
        assert!(!TrialState::Active.can_transition_to(&TrialState::Expired));
    }

    #[test]
    fn ending_soon_reaches_every_terminal() {
        for target in [TrialState::Converted, TrialState::Expired, TrialState::Canceled] {
            assert!(TrialState::EndingSoon.can_transition_to(&target));
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Terminal and Monotonic Guarantees
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn terminal_states_accept_nothing() {
        for terminal in [TrialState::Converted, TrialState::Expired, TrialState::Canceled] {
            assert!(terminal.is_terminal());
            for target in TrialState::ALL {
                assert!(terminal.transition_to(target).is_err());
            }
        }
    }

    #[test]
    fn every_edge_moves_forward() {
        for from in TrialState::ALL {
            for to in from.valid_transitions() {
                assert!(to.rank() > from.rank(), "{} -> {} is not forward", from, to);
            }
        }
    }

    #[test]
    fn expired_cannot_return_to_active() {
        assert!(TrialState::Expired.transition_to(TrialState::Active).is_err());
    }

    #[test]
    fn parses_from_display_form() {
        for state in TrialState::ALL {
            assert_eq!(state.to_string().parse::<TrialState>().unwrap(), state);
        }
        assert!("paused".parse::<TrialState>().is_err());
    }
}
