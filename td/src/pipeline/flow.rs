//! Glue between the transition table and a live `Project`: the single
//! place callers go through to move a project's status, so the invariant
//! checks in [`super::definition`] can never be bypassed by a stray
//! `project.status = ...` elsewhere in the codebase.

use crate::domain::{Project, ProjectStatus};

use super::definition::{IllegalTransition, validate_transition};

/// Move `project` to `to`, validating the edge and bumping `updated_at`.
/// Leaves `project` untouched on rejection.
pub fn transition(project: &mut Project, to: ProjectStatus) -> Result<(), IllegalTransition> {
    validate_transition(project.status, to)?;
    project.status = to;
    project.touch();
    Ok(())
}

/// Whether `project` is currently eligible for `service`'s status filter.
/// Drake monitoring has no filter and is handled by the caller directly
/// against the live Drake registry instead of this function.
pub fn is_eligible(project: &Project, service: super::triggers::Service) -> bool {
    match service.status_filter() {
        Some(status) => project.status == status,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::triggers::Service;

    fn project() -> Project {
        Project::new("demo", "/tmp/demo")
    }

    #[test]
    fn transition_rejects_illegal_edge() {
        let mut p = project();
        assert!(transition(&mut p, ProjectStatus::Completed).is_err());
        assert_eq!(p.status, ProjectStatus::Prototype);
    }

    #[test]
    fn transition_applies_legal_edge_and_touches() {
        let mut p = project();
        let before = p.updated_at;
        transition(&mut p, ProjectStatus::New).unwrap();
        assert_eq!(p.status, ProjectStatus::New);
        assert!(p.updated_at >= before);
    }

    #[test]
    fn eligibility_follows_status_filter() {
        let mut p = project();
        assert!(!is_eligible(&p, Service::Wyrm));
        transition(&mut p, ProjectStatus::New).unwrap();
        assert!(is_eligible(&p, Service::Wyrm));
        assert!(!is_eligible(&p, Service::Wyvern));
    }
}
