//! `Task` - one row in a project's markdown task file.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use taskstore::IndexValue;

use super::priority::Priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum TaskStatus {
    #[default]
    Unassigned,
    NotInitialized,
    Working,
    Done,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unassigned" => Ok(Self::Unassigned),
            "notinitialized" | "not_initialized" | "not initialized" => Ok(Self::NotInitialized),
            "working" => Ok(Self::Working),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

/// The constant used for an assignee column when no kobold owns the task.
pub const UNASSIGNED_ASSIGNEE: &str = "unassigned";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub priority: Priority,
    pub assigned_agent_type: String,
    /// `UNASSIGNED_ASSIGNEE` or a kobold id.
    pub assignee: String,
    pub status: TaskStatus,
    pub spec_version_id: String,
    /// Dependency level computed by Wyvern (0 = no deps). Not a markdown
    /// column; carried only in the in-memory tracker and `analysis.json`.
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>, spec_version_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            priority: Priority::default(),
            assigned_agent_type: String::new(),
            assignee: UNASSIGNED_ASSIGNEE.to_string(),
            status: TaskStatus::Unassigned,
            spec_version_id: spec_version_id.into(),
            level: 0,
            depends_on: Vec::new(),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.assignee != UNASSIGNED_ASSIGNEE
    }

    pub fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields.insert("assignee".to_string(), IndexValue::String(self.assignee.clone()));
        fields
    }
}
