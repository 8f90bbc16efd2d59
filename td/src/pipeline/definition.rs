//! The project lifecycle state machine: which `ProjectStatus` transitions
//! are legal, and the one trigger table every periodic worker reads from.

use thiserror::Error;

use crate::domain::ProjectStatus;

#[derive(Debug, Error)]
#[error("illegal project transition: {from} -> {to}")]
pub struct IllegalTransition {
    pub from: ProjectStatus,
    pub to: ProjectStatus,
}

/// Validate a proposed status change against the lifecycle graph (§3):
///
/// ```text
/// Prototype -> New -> WyrmAssigned -> Analyzed -> InProgress
///   -> AwaitingVerification -> Verified -> Completed
/// ```
///
/// with exactly one back-edge, `AwaitingVerification -> InProgress` on a
/// failed verification run, and a `Failed` terminal reachable from anywhere.
/// `Completed -> InProgress` and any other backward edge are rejected.
pub fn validate_transition(from: ProjectStatus, to: ProjectStatus) -> Result<(), IllegalTransition> {
    use ProjectStatus::*;

    if from == to {
        return Ok(());
    }

    let allowed = match (from, to) {
        (Prototype, New) => true,
        (New, WyrmAssigned) => true,
        (WyrmAssigned, Analyzed) => true,
        (Analyzed, InProgress) => true,
        (InProgress, AwaitingVerification) => true,
        (AwaitingVerification, Verified) => true,
        (AwaitingVerification, InProgress) => true,
        (Verified, Completed) => true,
        (_, Failed) => true,
        _ => false,
    };

    if allowed { Ok(()) } else { Err(IllegalTransition { from, to }) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProjectStatus::*;

    #[test]
    fn forward_path_is_allowed() {
        assert!(validate_transition(Prototype, New).is_ok());
        assert!(validate_transition(New, WyrmAssigned).is_ok());
        assert!(validate_transition(WyrmAssigned, Analyzed).is_ok());
        assert!(validate_transition(Analyzed, InProgress).is_ok());
        assert!(validate_transition(InProgress, AwaitingVerification).is_ok());
        assert!(validate_transition(AwaitingVerification, Verified).is_ok());
        assert!(validate_transition(Verified, Completed).is_ok());
    }

    #[test]
    fn the_one_back_edge_is_allowed() {
        assert!(validate_transition(AwaitingVerification, InProgress).is_ok());
    }

    #[test]
    fn completed_to_in_progress_is_forbidden() {
        assert!(validate_transition(Completed, InProgress).is_err());
    }

    #[test]
    fn arbitrary_skip_is_forbidden() {
        assert!(validate_transition(New, InProgress).is_err());
        assert!(validate_transition(Prototype, Completed).is_err());
    }

    #[test]
    fn failure_is_reachable_from_anywhere() {
        assert!(validate_transition(New, Failed).is_ok());
        assert!(validate_transition(InProgress, Failed).is_ok());
    }
}
