//! State machine trait for closed enumerations of states.
//!
//! The intake phase and the escalation guard both declare their transition
//! graph through this trait, so an illegal move is caught in one place.

use super::ValidationError;

/// Trait for enums whose values form a closed transition graph.
///
/// ```ignore
/// impl StateMachine for IntakePhase {
///     fn can_transition_to(&self, target: &Self) -> bool {
///         self.valid_transitions().contains(target)
///     }
///
///     fn valid_transitions(&self) -> Vec<Self> {
///         match self {
///             Initial => vec![Identification, CollectingName, /* ... */],
///             // ...
///         }
///     }
/// }
///
/// let next = phase.transition_to(IntakePhase::UnderstandingNeed)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs transition with validation, returning error if invalid.
    ///
    /// Moving to the current state is always accepted and is a no-op.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if *self == target || self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Validated in-place transition.
    fn advance(&mut self, target: Self) -> Result<(), ValidationError> {
        *self = self.transition_to(target)?;
        Ok(())
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}
