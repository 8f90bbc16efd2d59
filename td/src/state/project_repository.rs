//! The project repository (§4.10, §5): the only writer of the project
//! registry. Backed by a [`Store<Project>`]; spec files and synthesized
//! specs are written straight to each project's workspace.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use taskstore::{Filter, IndexValue, Store};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::agent::ProjectRepository as ProjectRepositoryTrait;
use crate::domain::{self, Project, ProjectStatus, TaskStatus, VerificationState, sanitize_name, version_if_changed};
use crate::pipeline;

use super::task_file;

pub struct ProjectRepository {
    root: PathBuf,
    store: Store<Project>,
}

/// Total/done task counts read straight off a project's task files, for
/// `project list`/`project show` - cheaper than replaying Wyvern's
/// analysis and tolerant of a project that hasn't reached Analyzed yet
/// (empty `task_files` just reports zero).
pub fn task_counts(project: &Project) -> (usize, usize) {
    let mut total = 0;
    let mut done = 0;
    for path in &project.paths.task_files {
        let Ok(content) = std::fs::read_to_string(path) else { continue };
        let Ok(parsed) = task_file::parse(&content) else { continue };
        total += parsed.rows.len();
        done += parsed.rows.iter().filter(|r| r.status == TaskStatus::Done).count();
    }
    (total, done)
}

impl ProjectRepository {
    pub fn open(root: impl AsRef<Path>) -> eyre::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let store = Store::open(root.join(".projects"))?;
        Ok(Self { root, store })
    }

    fn project_root(&self, sanitized_name: &str) -> PathBuf {
        self.root.join(sanitized_name)
    }

    /// All projects currently sitting in `status`, for a periodic worker's
    /// cycle to pick up.
    pub fn by_status(&self, status: ProjectStatus) -> Vec<Project> {
        self.store.query(&[Filter::eq("status", IndexValue::String(status.to_string()))])
    }

    /// Every known project, regardless of status. Used by startup recovery.
    pub fn all(&self) -> Vec<Project> {
        self.store.all()
    }

    fn synthesize_spec(path: &Path) -> String {
        let mut files = Vec::new();
        for entry in WalkDir::new(path).max_depth(3).into_iter().filter_map(Result::ok) {
            if entry.file_type().is_file() {
                if let Ok(rel) = entry.path().strip_prefix(path) {
                    files.push(rel.display().to_string());
                }
            }
            if files.len() >= 200 {
                break;
            }
        }
        files.sort();
        let mut spec = String::from("# Imported project\n\nThis specification was synthesized from an existing codebase.\n\n## Detected files\n\n");
        for f in &files {
            spec.push_str(&format!("- {f}\n"));
        }
        spec
    }
}

#[async_trait]
impl ProjectRepositoryTrait for ProjectRepository {
    async fn find_by_name(&self, name: &str) -> Option<Project> {
        let sanitized = sanitize_name(name);
        self.store.query(&[Filter::eq("sanitized_name", IndexValue::String(sanitized))]).into_iter().next()
    }

    async fn get(&self, project_id: &str) -> Option<Project> {
        self.store.get(project_id)
    }

    async fn list(&self) -> Vec<Project> {
        self.store.all()
    }

    async fn save(&self, project: &Project) -> eyre::Result<()> {
        self.store.put(project.clone())
    }

    async fn write_specification(&self, project_name: &str, content: &str) -> eyre::Result<Project> {
        let mut project = match self.find_by_name(project_name).await {
            Some(p) => p,
            None => {
                let root = self.project_root(&sanitize_name(project_name)).display().to_string();
                let project = Project::new(project_name, root);
                info!(project_id = %project.id, name = project_name, "project repository: registered new project");
                project
            }
        };

        taskstore::atomic_write(Path::new(&project.paths.specification), content.as_bytes())?;

        if let Some(version) = version_if_changed(project.active_spec_version(), content.as_bytes()) {
            project.spec_versions.push(version);
        }
        project.touch();
        self.store.put(project.clone())?;
        Ok(project)
    }

    async fn add_existing_project(&self, path: &str, project_name: Option<&str>) -> eyre::Result<Project> {
        let name = project_name.map(str::to_string).unwrap_or_else(|| {
            Path::new(path).file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "imported-project".to_string())
        });

        let mut project = Project::new(&name, path);
        project.imported = true;
        let spec = Self::synthesize_spec(Path::new(path));
        taskstore::atomic_write(Path::new(&project.paths.specification), spec.as_bytes())?;
        project.spec_versions.push(domain::SpecVersion::from_content(spec.as_bytes()));

        self.store.put(project.clone())?;
        info!(project_id = %project.id, %path, "project repository: imported existing project");
        Ok(project)
    }

    async fn transition(&self, project_id: &str, to: ProjectStatus) -> eyre::Result<()> {
        let mut project = self.store.get(project_id).ok_or_else(|| eyre::eyre!("unknown project {project_id}"))?;
        pipeline::transition(&mut project, to).map_err(|e| eyre::eyre!(e))?;
        self.store.put(project)?;
        Ok(())
    }

    async fn verification_state(&self, project_id: &str) -> Option<VerificationState> {
        self.store.get(project_id).map(|p| p.verification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_specification_registers_new_project_in_prototype() {
        let dir = tempdir().unwrap();
        let repo = ProjectRepository::open(dir.path()).unwrap();

        let project = repo.write_specification("Todo App", "# Todo App\n\nBuild a todo app.").await.unwrap();
        assert_eq!(project.status, ProjectStatus::Prototype);
        assert_eq!(project.spec_versions.len(), 1);

        let reloaded = repo.find_by_name("Todo App").await.unwrap();
        assert_eq!(reloaded.id, project.id);
    }

    #[tokio::test]
    async fn rewriting_identical_spec_does_not_fork_version_history() {
        let dir = tempdir().unwrap();
        let repo = ProjectRepository::open(dir.path()).unwrap();
        repo.write_specification("Todo App", "same content").await.unwrap();
        let second = repo.write_specification("Todo App", "same content").await.unwrap();
        assert_eq!(second.spec_versions.len(), 1);
    }

    #[tokio::test]
    async fn add_existing_project_is_marked_imported_and_prototype() {
        let dir = tempdir().unwrap();
        let repo = ProjectRepository::open(dir.path()).unwrap();

        let project_dir = tempdir().unwrap();
        std::fs::write(project_dir.path().join("main.rs"), "fn main() {}").unwrap();

        let project = repo.add_existing_project(project_dir.path().to_str().unwrap(), Some("legacy-app")).await.unwrap();
        assert!(project.imported);
        assert_eq!(project.status, ProjectStatus::Prototype);
    }

    #[tokio::test]
    async fn transition_validates_through_the_pipeline() {
        let dir = tempdir().unwrap();
        let repo = ProjectRepository::open(dir.path()).unwrap();
        let project = repo.write_specification("Todo App", "spec").await.unwrap();

        repo.transition(&project.id, ProjectStatus::New).await.unwrap();
        let reloaded = repo.get(&project.id).await.unwrap();
        assert_eq!(reloaded.status, ProjectStatus::New);

        let bad = repo.transition(&project.id, ProjectStatus::Completed).await;
        assert!(bad.is_err());
    }
}
