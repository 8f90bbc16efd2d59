//! The `Project` record - identity, paths, and lifecycle status for one
//! generated codebase.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use taskstore::{IndexValue, Record, now_ms};
use tracing::debug;

use super::spec_version::SpecVersion;
use super::verification::VerificationState;

/// Project lifecycle status. Advanced by the periodic workers, Drake, and
/// the verifier; transitions are validated by `crate::pipeline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ProjectStatus {
    /// Registered via `add_existing_project` or before spec approval.
    Prototype,
    /// Spec approved; awaiting Wyrm.
    #[default]
    New,
    /// Wyrm recommendation written.
    WyrmAssigned,
    /// Wyvern analysis + task files written.
    Analyzed,
    /// Drake execution underway.
    InProgress,
    /// All task files drained; waiting for the verifier.
    AwaitingVerification,
    /// Verification checks passed.
    Verified,
    /// Verified and no fix-tasks pending.
    Completed,
    /// Terminal failure state (not reachable by normal flow today; reserved
    /// for explicit user action or a future stop-the-world error path).
    Failed,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Filesystem layout for one project, rooted at `{ProjectsPath}/{sanitized-name}/`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectPaths {
    pub root: String,
    pub workspace: String,
    pub specification: String,
    pub wyrm_recommendation: String,
    pub analysis_md: String,
    pub analysis_json: String,
    pub task_files: Vec<String>,
    pub kobold_plans: String,
    pub planning_context: String,
}

impl ProjectPaths {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            workspace: format!("{root}/workspace"),
            specification: format!("{root}/specification.md"),
            wyrm_recommendation: format!("{root}/wyrm-recommendation.json"),
            analysis_md: format!("{root}/analysis.md"),
            analysis_json: format!("{root}/analysis.json"),
            task_files: Vec::new(),
            kobold_plans: format!("{root}/kobold-plans"),
            planning_context: format!("{root}/planning-context.json"),
            root,
        }
    }
}

/// Per-project override of the global verification policy (§6.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub enabled: bool,
    pub timeout_seconds: u64,
    pub auto_create_fix_tasks: bool,
    pub require_all_checks_passing: bool,
    pub skip_for_imported_projects: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_seconds: 600,
            auto_create_fix_tasks: true,
            require_all_checks_passing: true,
            skip_for_imported_projects: true,
        }
    }
}

/// `{provider, model}` override for one agent type (wyrm, wyvern, kobold,
/// dragon, or a specific language agent type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOverride {
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub sanitized_name: String,
    pub status: ProjectStatus,
    pub paths: ProjectPaths,
    /// Absolute paths outside `paths.workspace` that tools may also touch.
    #[serde(default)]
    pub allowed_external_paths: HashSet<String>,
    pub verification: VerificationState,
    pub verification_config: VerificationConfig,
    #[serde(default)]
    pub provider_overrides: HashMap<String, ProviderOverride>,
    #[serde(default)]
    pub spec_versions: Vec<SpecVersion>,
    /// True for projects registered through `add_existing_project` rather
    /// than `write_specification`; consulted by `skip_for_imported_projects`.
    #[serde(default)]
    pub imported: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Project {
    pub fn new(name: impl Into<String>, root: impl Into<String>) -> Self {
        let name = name.into();
        let sanitized_name = super::id::sanitize_name(&name);
        let now = now_ms();
        debug!(%name, %sanitized_name, "Project::new: called");
        Self {
            id: super::id::generate_id("project"),
            paths: ProjectPaths::new(root.into()),
            name,
            sanitized_name,
            status: ProjectStatus::Prototype,
            allowed_external_paths: HashSet::new(),
            verification: VerificationState::default(),
            verification_config: VerificationConfig::default(),
            provider_overrides: HashMap::new(),
            spec_versions: Vec::new(),
            imported: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current spec version, or `None` if no spec has been written yet.
    pub fn active_spec_version(&self) -> Option<&SpecVersion> {
        self.spec_versions.last()
    }

    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }
}

impl Record for Project {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "project"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields.insert("sanitized_name".to_string(), IndexValue::String(self.sanitized_name.clone()));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_project_starts_in_prototype() {
        let p = Project::new("My Todo App", "/data/projects/my-todo-app");
        assert_eq!(p.status, ProjectStatus::Prototype);
        assert_eq!(p.sanitized_name, "my-todo-app");
        assert!(p.spec_versions.is_empty());
    }
}
