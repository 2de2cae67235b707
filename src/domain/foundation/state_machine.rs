//! State machine trait for lifecycle enums.

use super::ValidationError;

/// Trait for status enums whose values move along a fixed transition table.
///
/// Implementors list the legal edges; validated transitions and terminal
/// detection come for free.
///
/// ```ignore
/// let next = TrialState::Active.transition_to(TrialState::EndingSoon)?;
/// assert!(TrialState::Converted.is_terminal());
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if the edge `self -> target` exists.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns every state reachable in one step.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs the transition, rejecting edges that are not in the table.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// A state with no outgoing edges is terminal.
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}
