//! Startup recovery: rebuild the project store's index from its log and
//! confirm every project's task files still parse. A crash mid-write never
//! leaves a torn file (all durable artifacts go through atomic writes), but
//! a hand-edited task file can still be malformed, and §4.5 requires that to
//! surface loudly rather than silently drop tasks.

use tracing::warn;

use super::project_repository::ProjectRepository;
use super::task_file;

#[derive(Debug, Default, serde::Serialize)]
pub struct RecoveryStats {
    pub projects: usize,
    pub task_files_checked: usize,
    pub task_files_malformed: usize,
}

/// Scans every known project's task files for parse errors without
/// mutating anything. Called once at daemon startup; malformed files are
/// logged so an operator notices before the owning Drake refuses to start.
pub fn scan_for_recovery(repository: &ProjectRepository) -> RecoveryStats {
    let mut stats = RecoveryStats::default();
    let projects = repository.all();
    stats.projects = projects.len();

    for project in &projects {
        for path in &project.paths.task_files {
            stats.task_files_checked += 1;
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    if let Err(e) = task_file::parse(&content) {
                        stats.task_files_malformed += 1;
                        warn!(project_id = %project.id, %path, error = %e, "recovery: task file failed to parse");
                    }
                }
                Err(e) => {
                    stats.task_files_malformed += 1;
                    warn!(project_id = %project.id, %path, error = %e, "recovery: task file unreadable");
                }
            }
        }
    }

    stats
}
