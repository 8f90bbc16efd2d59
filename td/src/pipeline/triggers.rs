//! Static per-service trigger table (§4.6): which `ProjectStatus` a service
//! picks work up from, how often it ticks, and its concurrency cap. The
//! scheduler reads this table; it does not hardcode per-service behavior.

use std::time::Duration;

use crate::domain::ProjectStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Wyrm,
    Wyvern,
    DrakeExecution,
    DrakeMonitoring,
    Verification,
}

impl Service {
    pub const ALL: [Service; 5] =
        [Service::Wyrm, Service::Wyvern, Service::DrakeExecution, Service::DrakeMonitoring, Service::Verification];

    pub fn name(self) -> &'static str {
        match self {
            Self::Wyrm => "wyrm",
            Self::Wyvern => "wyvern",
            Self::DrakeExecution => "drake_execution",
            Self::DrakeMonitoring => "drake_monitoring",
            Self::Verification => "verification",
        }
    }

    /// Default tick interval, before config overrides and stagger.
    pub fn default_interval(self) -> Duration {
        match self {
            Self::Wyrm => Duration::from_secs(60),
            Self::Wyvern => Duration::from_secs(60),
            Self::DrakeExecution => Duration::from_secs(30),
            Self::DrakeMonitoring => Duration::from_secs(60),
            Self::Verification => Duration::from_secs(30),
        }
    }

    /// The `ProjectStatus` this service scans for on each tick, or `None`
    /// for Drake monitoring, which instead iterates live Drakes rather than
    /// a status filter.
    pub fn status_filter(self) -> Option<ProjectStatus> {
        match self {
            Self::Wyrm => Some(ProjectStatus::New),
            Self::Wyvern => Some(ProjectStatus::WyrmAssigned),
            Self::DrakeExecution => Some(ProjectStatus::Analyzed),
            Self::DrakeMonitoring => None,
            Self::Verification => Some(ProjectStatus::AwaitingVerification),
        }
    }

    /// Max projects processed concurrently within one cycle.
    pub fn project_concurrency(self) -> usize {
        match self {
            Self::Wyrm => 5,
            Self::Wyvern => 5,
            Self::DrakeExecution => 5,
            Self::DrakeMonitoring => 5,
            Self::Verification => 3,
        }
    }

    /// Max Kobold workers started per project, within Drake execution only.
    pub fn workers_per_project(self) -> Option<usize> {
        match self {
            Self::DrakeExecution => Some(4),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_published_intervals() {
        assert_eq!(Service::Wyrm.default_interval(), Duration::from_secs(60));
        assert_eq!(Service::DrakeExecution.default_interval(), Duration::from_secs(30));
        assert_eq!(Service::Verification.project_concurrency(), 3);
        assert_eq!(Service::DrakeExecution.workers_per_project(), Some(4));
        assert_eq!(Service::Wyrm.workers_per_project(), None);
    }

    #[test]
    fn drake_monitoring_has_no_status_filter() {
        assert_eq!(Service::DrakeMonitoring.status_filter(), None);
    }
}
