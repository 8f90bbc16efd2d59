//! Async front for the shared planning context (§4.9). The underlying
//! [`contextstore::ContextStore`] exposes a synchronous, blocking API (a
//! small RwLock-guarded cache plus blocking file I/O for eviction and
//! full-flush paths; everyday mutations just signal a debounced background
//! writer); this wrapper moves every call onto a blocking thread so callers
//! in the agent layer never stall the runtime on an LRU eviction flush.

use std::sync::Arc;

use contextstore::{ContextStore, PlanningInsight, ProjectStatistics};
use tracing::warn;

#[derive(Clone)]
pub struct SharedPlanningContext {
    inner: Arc<ContextStore>,
}

impl SharedPlanningContext {
    pub fn open(root: impl AsRef<std::path::Path>) -> eyre::Result<Self> {
        Ok(Self { inner: Arc::new(ContextStore::open(root)?) })
    }

    pub async fn register_agent(&self, project_id: &str, agent_id: &str, task_id: &str, agent_type: &str) {
        let (inner, project_id, agent_id, task_id, agent_type) =
            (self.inner.clone(), project_id.to_string(), agent_id.to_string(), task_id.to_string(), agent_type.to_string());
        self.run_blocking(move || inner.register_agent(&project_id, &agent_id, &task_id, &agent_type)).await;
    }

    pub async fn set_files_hint(&self, project_id: &str, agent_id: &str, files: Vec<String>) {
        let (inner, project_id, agent_id) = (self.inner.clone(), project_id.to_string(), agent_id.to_string());
        self.run_blocking(move || inner.set_files_hint(&project_id, &agent_id, files)).await;
    }

    pub async fn unregister_agent(&self, project_id: &str, agent_id: &str, insight: PlanningInsight) {
        let (inner, project_id, agent_id) = (self.inner.clone(), project_id.to_string(), agent_id.to_string());
        self.run_blocking(move || inner.unregister_agent(&project_id, &agent_id, insight)).await;
    }

    pub async fn is_file_in_use(&self, project_id: &str, file: &str) -> bool {
        let (inner, project_id, file) = (self.inner.clone(), project_id.to_string(), file.to_string());
        tokio::task::spawn_blocking(move || inner.is_file_in_use(&project_id, &file).unwrap_or(false)).await.unwrap_or(false)
    }

    pub async fn similar_task_insights(&self, project_id: &str, agent_type: &str, max: usize) -> Vec<PlanningInsight> {
        let (inner, project_id, agent_type) = (self.inner.clone(), project_id.to_string(), agent_type.to_string());
        tokio::task::spawn_blocking(move || inner.similar_task_insights(&project_id, &agent_type, max).unwrap_or_default()).await.unwrap_or_default()
    }

    pub async fn cross_project_insights(&self, exclude_project_id: &str, agent_type: &str, max: usize) -> Vec<PlanningInsight> {
        let (inner, exclude_project_id, agent_type) = (self.inner.clone(), exclude_project_id.to_string(), agent_type.to_string());
        tokio::task::spawn_blocking(move || inner.cross_project_insights(&exclude_project_id, &agent_type, max)).await.unwrap_or_default()
    }

    pub async fn project_statistics(&self, project_id: &str) -> ProjectStatistics {
        let (inner, project_id) = (self.inner.clone(), project_id.to_string());
        tokio::task::spawn_blocking(move || inner.project_statistics(&project_id).unwrap_or_default()).await.unwrap_or_default()
    }

    /// Called on daemon shutdown.
    pub async fn persist_all(&self) {
        let inner = self.inner.clone();
        self.run_blocking(move || inner.persist_all()).await;
    }

    async fn run_blocking<F>(&self, f: F)
    where
        F: FnOnce() -> eyre::Result<()> + Send + 'static,
    {
        match tokio::task::spawn_blocking(f).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "planning context: operation failed"),
            Err(e) => warn!(error = %e, "planning context: blocking task panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn register_and_query_files_in_use() {
        let dir = tempdir().unwrap();
        let ctx = SharedPlanningContext::open(dir.path()).unwrap();
        ctx.register_agent("p1", "agent-a", "t1", "backend").await;
        ctx.set_files_hint("p1", "agent-a", vec!["src/main.rs".into()]).await;
        assert!(ctx.is_file_in_use("p1", "src/main.rs").await);
    }
}
