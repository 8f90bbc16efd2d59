//! `Kobold` - a single worker executing one task through an agent loop.
//!
//! A Kobold owns its state machine exclusively (§4.4): only its own code
//! transitions `status`. Supervisors (Drake) observe but never force a
//! transition, except in the one documented stuck-worker recovery path,
//! which unbinds the Kobold rather than mutating it.

use serde::{Deserialize, Serialize};
use taskstore::now_ms;

use super::id::generate_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum KoboldStatus {
    #[default]
    Unassigned,
    Assigned,
    Working,
    Done,
}

#[derive(Debug, thiserror::Error)]
pub enum KoboldStateError {
    #[error("cannot assign task: kobold {0} is not Unassigned")]
    NotUnassigned(String),
    #[error("cannot start work: kobold {0} is not Assigned")]
    NotAssigned(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kobold {
    pub id: String,
    pub agent_type: String,
    pub task_id: Option<String>,
    pub status: KoboldStatus,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub assigned_at: Option<i64>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl Kobold {
    pub fn new(agent_type: impl Into<String>) -> Self {
        Self {
            id: generate_id("kobold"),
            agent_type: agent_type.into(),
            task_id: None,
            status: KoboldStatus::Unassigned,
            error_message: None,
            created_at: now_ms(),
            assigned_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn assign_task(&mut self, task_id: impl Into<String>) -> Result<(), KoboldStateError> {
        if self.status != KoboldStatus::Unassigned {
            return Err(KoboldStateError::NotUnassigned(self.id.clone()));
        }
        self.task_id = Some(task_id.into());
        self.status = KoboldStatus::Assigned;
        self.assigned_at = Some(now_ms());
        Ok(())
    }

    /// Transition `Assigned -> Working`; the caller (the Kobold's own
    /// `start_work`) is the only legitimate invoker.
    pub fn mark_started(&mut self) -> Result<(), KoboldStateError> {
        if self.status != KoboldStatus::Assigned {
            return Err(KoboldStateError::NotAssigned(self.id.clone()));
        }
        self.status = KoboldStatus::Working;
        self.started_at = Some(now_ms());
        Ok(())
    }

    pub fn mark_done(&mut self, error_message: Option<String>) {
        self.status = KoboldStatus::Done;
        self.error_message = error_message;
        self.completed_at = Some(now_ms());
    }

    pub fn is_complete(&self) -> bool {
        self.status == KoboldStatus::Done
    }

    pub fn is_success(&self) -> bool {
        self.is_complete() && self.error_message.is_none()
    }

    pub fn has_error(&self) -> bool {
        self.error_message.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_requires_unassigned() {
        let mut k = Kobold::new("backend");
        k.assign_task("t1").unwrap();
        assert!(matches!(k.assign_task("t2"), Err(KoboldStateError::NotUnassigned(_))));
    }

    #[test]
    fn start_requires_assigned() {
        let mut k = Kobold::new("backend");
        assert!(matches!(k.mark_started(), Err(KoboldStateError::NotAssigned(_))));
        k.assign_task("t1").unwrap();
        assert!(k.mark_started().is_ok());
        assert_eq!(k.status, KoboldStatus::Working);
    }

    #[test]
    fn done_predicates() {
        let mut k = Kobold::new("backend");
        k.assign_task("t1").unwrap();
        k.mark_started().unwrap();
        k.mark_done(None);
        assert!(k.is_complete());
        assert!(k.is_success());
        assert!(!k.has_error());

        let mut k2 = Kobold::new("backend");
        k2.assign_task("t1").unwrap();
        k2.mark_started().unwrap();
        k2.mark_done(Some("boom".into()));
        assert!(k2.is_complete());
        assert!(!k2.is_success());
        assert!(k2.has_error());
    }
}
