//! `ToolContext` - execution context for one tool dispatch.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::ToolError;

/// Callback the `ask_user` tool posts a prompt through; the session
/// transport that actually renders the prompt is out of scope here (§4.2,
/// §4.10 - "the transport is out of scope").
#[async_trait::async_trait]
pub trait UserPrompter: Send + Sync {
    async fn ask(&self, prompt: &str) -> Option<String>;
}

/// Execution context for tools - scoped to one project workspace.
///
/// Filesystem tools must reject any path that, after canonicalization, is
/// not contained in `workspace` or one of `allowed_external_paths` (§4.2).
#[derive(Clone)]
pub struct ToolContext {
    /// Project workspace root - all file ops constrained here by default.
    pub workspace: PathBuf,
    /// Absolute paths outside `workspace` tools may also touch, mirroring
    /// `Project.allowed_external_paths`.
    pub allowed_external_paths: HashSet<PathBuf>,
    /// Id of the task this dispatch is running under (for logging).
    pub task_id: String,
    /// Files read this turn - `edit_file` refuses to touch a path that
    /// hasn't been read in the same context.
    read_files: Arc<Mutex<HashSet<PathBuf>>>,
    pub sandbox_enabled: bool,
    pub max_tokens: u32,
    pub user_prompter: Option<Arc<dyn UserPrompter>>,
}

const DEFAULT_MAX_TOKENS: u32 = 16384;

impl ToolContext {
    pub fn new(workspace: PathBuf, task_id: String) -> Self {
        debug!(?workspace, %task_id, "ToolContext::new: called");
        Self {
            workspace,
            allowed_external_paths: HashSet::new(),
            task_id,
            read_files: Arc::new(Mutex::new(HashSet::new())),
            sandbox_enabled: true,
            max_tokens: DEFAULT_MAX_TOKENS,
            user_prompter: None,
        }
    }

    pub fn new_unsandboxed(workspace: PathBuf, task_id: String) -> Self {
        let mut ctx = Self::new(workspace, task_id);
        ctx.sandbox_enabled = false;
        ctx
    }

    pub fn with_allowed_external_paths(mut self, paths: HashSet<PathBuf>) -> Self {
        self.allowed_external_paths = paths;
        self
    }

    pub fn with_user_prompter(mut self, prompter: Arc<dyn UserPrompter>) -> Self {
        self.user_prompter = Some(prompter);
        self
    }

    pub async fn track_read(&self, path: &Path) {
        let mut read_files = self.read_files.lock().await;
        read_files.insert(self.normalize_path(path));
    }

    pub async fn was_read(&self, path: &Path) -> bool {
        let read_files = self.read_files.lock().await;
        read_files.contains(&self.normalize_path(path))
    }

    pub async fn clear_reads(&self) {
        self.read_files.lock().await.clear();
    }

    fn normalize_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() { path.to_path_buf() } else { self.workspace.join(path) }
    }

    /// Sandbox enforcement: canonicalize `path` and reject it unless it
    /// lives under `workspace` or one of `allowed_external_paths`.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        let normalized = self.normalize_path(path);

        if !self.sandbox_enabled {
            return Ok(normalized);
        }

        let canonical = if normalized.exists() {
            normalized.canonicalize().unwrap_or_else(|_| normalized.clone())
        } else if let Some(parent) = normalized.parent().filter(|p| p.exists()) {
            let canonical_parent = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
            canonical_parent.join(normalized.file_name().unwrap_or_default())
        } else {
            normalized.clone()
        };

        let workspace_canonical = self.workspace.canonicalize().unwrap_or_else(|_| self.workspace.clone());
        if canonical.starts_with(&workspace_canonical) {
            return Ok(canonical);
        }

        for allowed in &self.allowed_external_paths {
            let allowed_canonical = allowed.canonicalize().unwrap_or_else(|_| allowed.clone());
            if canonical.starts_with(&allowed_canonical) {
                return Ok(canonical);
            }
        }

        Err(ToolError::SandboxViolation { path: path.to_path_buf(), workspace: self.workspace.clone() })
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext").field("workspace", &self.workspace).field("task_id", &self.task_id).field("sandbox_enabled", &self.sandbox_enabled).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn track_and_check_read() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "task-1".to_string());
        let file_path = Path::new("src/lib.rs");
        assert!(!ctx.was_read(file_path).await);
        ctx.track_read(file_path).await;
        assert!(ctx.was_read(file_path).await);
    }

    #[tokio::test]
    async fn clear_reads_forgets_everything() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "task-1".to_string());
        ctx.track_read(Path::new("a.rs")).await;
        ctx.clear_reads().await;
        assert!(!ctx.was_read(Path::new("a.rs")).await);
    }

    #[tokio::test]
    async fn validate_path_within_workspace() {
        let temp = tempdir().unwrap();
        let workspace = temp.path().to_path_buf();
        fs::write(workspace.join("test.txt"), "content").unwrap();
        let ctx = ToolContext::new(workspace, "task-1".to_string());
        assert!(ctx.validate_path(Path::new("test.txt")).is_ok());
    }

    #[tokio::test]
    async fn validate_path_outside_workspace_rejected() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "task-1".to_string());
        let result = ctx.validate_path(Path::new("/etc/passwd"));
        assert!(matches!(result.unwrap_err(), ToolError::SandboxViolation { .. }));
    }

    #[tokio::test]
    async fn validate_path_within_allowed_external_path() {
        let temp = tempdir().unwrap();
        let external = tempdir().unwrap();
        fs::write(external.path().join("shared.txt"), "x").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "task-1".to_string())
            .with_allowed_external_paths(HashSet::from([external.path().to_path_buf()]));
        let result = ctx.validate_path(&external.path().join("shared.txt"));
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn sandbox_disabled_allows_anything() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new_unsandboxed(temp.path().to_path_buf(), "task-1".to_string());
        assert!(ctx.validate_path(Path::new("/etc/passwd")).is_ok());
    }
}
