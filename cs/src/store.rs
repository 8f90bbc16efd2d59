//! The shared planning context: per-project coordination state visible to
//! every Kobold working that project - who else is active, what they're
//! touching, and what happened on their most recently completed tasks.
//!
//! Persistence mirrors `taskstore`'s style (atomic JSON writes, content
//! addressed by project id) but the access pattern here is different enough
//! to warrant its own store: contexts are cached in an LRU of bounded size
//! because a long-running daemon may have touched far more projects than it
//! wants resident in memory, and a cold read for an evicted project should
//! transparently reload from disk.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use taskstore::{DebouncedWriter, atomic_write_json, now_ms};
use tracing::{debug, info};

/// Cap on insights retained per project; oldest is dropped first.
pub const MAX_INSIGHTS: usize = 100;

/// Cap on the number of project contexts held in memory at once.
pub const MAX_CACHED_CONTEXTS: usize = 50;

/// Coalescing window for the background persist pass - matches the Drake
/// task-file writer's debounce.
const WRITE_DEBOUNCE: Duration = Duration::from_secs(2);

/// One completed task, recorded for future planner priming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningInsight {
    pub task_id: String,
    pub agent_type: String,
    pub timestamp: i64,
    pub success: bool,
    pub duration_seconds: f64,
    pub step_count: usize,
    pub completed_steps: usize,
    pub total_iterations: u32,
    pub files_modified: Vec<String>,
    pub files_created: Vec<String>,
    pub error_message: Option<String>,
}

/// An agent currently working a task in a project.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActiveAgent {
    pub task_id: String,
    pub agent_type: String,
    pub registered_at: i64,
    /// Advisory hint of files the agent's current plan step intends to
    /// modify. Populated by the planner agent; absent/empty is not an
    /// error, just "nothing to advise about".
    #[serde(default)]
    pub files_hint: Vec<String>,
}

/// Per-project coordination state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningContext {
    pub project_id: String,
    pub created_at: i64,
    pub last_accessed_at: i64,
    pub active_agents: HashMap<String, ActiveAgent>,
    pub insights: VecDeque<PlanningInsight>,
}

impl PlanningContext {
    fn new(project_id: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            project_id: project_id.into(),
            created_at: now,
            last_accessed_at: now,
            active_agents: HashMap::new(),
            insights: VecDeque::new(),
        }
    }

    fn push_insight(&mut self, insight: PlanningInsight) {
        self.insights.push_back(insight);
        while self.insights.len() > MAX_INSIGHTS {
            self.insights.pop_front();
        }
    }
}

/// Aggregate statistics derived from a project's insight history.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectStatistics {
    pub task_count: usize,
    pub success_rate: f64,
    pub avg_duration_seconds: f64,
    pub avg_step_count: f64,
    pub avg_iterations: f64,
    pub stuck_kobolds: u32,
}

struct CacheEntry {
    context: PlanningContext,
    touched_at: i64,
    /// Set on every mutation, cleared once the debounced writer flushes it.
    dirty: bool,
}

fn context_path(root: &Path, project_id: &str) -> PathBuf {
    root.join(project_id).join("planning-context.json")
}

fn flush_dirty_locked(root: &Path, cache: &mut HashMap<String, CacheEntry>) -> Result<()> {
    for (project_id, entry) in cache.iter_mut() {
        if !entry.dirty {
            continue;
        }
        atomic_write_json(&context_path(root, project_id), &entry.context)?;
        entry.dirty = false;
    }
    Ok(())
}

/// LRU-capped, disk-backed registry of [`PlanningContext`]s.
///
/// One instance is process-wide (per the source system's singleton shared
/// context); every mutation is serialized per-project by the outer
/// `RwLock`, matching the "dedicated lock per project" policy in the
/// specification without actually sharding the lock (the cache is small and
/// contention across distinct projects is expected to be rare).
///
/// Mutations mark their entry dirty and signal a [`DebouncedWriter`] rather
/// than writing straight through - the same coalescing-write pattern the
/// Drake task-file writer uses, so a burst of `register_agent`/
/// `set_files_hint` calls against one project costs one full JSON
/// serialize instead of one per call. Eviction and `persist_all` still
/// write immediately, since those paths are about to drop the entry from
/// memory.
pub struct ContextStore {
    root: PathBuf,
    max_cached_contexts: usize,
    cache: Arc<RwLock<HashMap<String, CacheEntry>>>,
    writer: DebouncedWriter,
}

impl ContextStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_limit(root, MAX_CACHED_CONTEXTS)
    }

    pub fn open_with_limit(root: impl AsRef<Path>, max_cached_contexts: usize) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).with_context(|| format!("creating {}", root.display()))?;
        let cache: Arc<RwLock<HashMap<String, CacheEntry>>> = Arc::new(RwLock::new(HashMap::new()));

        let flush_cache = cache.clone();
        let flush_root = root.clone();
        let writer = DebouncedWriter::spawn(
            WRITE_DEBOUNCE,
            Box::new(move || {
                let cache = flush_cache.clone();
                let root = flush_root.clone();
                Box::pin(async move {
                    let mut cache = cache.write().expect("context cache poisoned");
                    flush_dirty_locked(&root, &mut cache)
                })
            }),
        );

        Ok(Self { root, max_cached_contexts, cache, writer })
    }

    fn path_for(&self, project_id: &str) -> PathBuf {
        context_path(&self.root, project_id)
    }

    fn load_from_disk(&self, project_id: &str) -> PlanningContext {
        let path = self.path_for(project_id);
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(ctx) => ctx,
                Err(e) => {
                    debug!(project_id, error = %e, "planning-context.json malformed, starting fresh");
                    PlanningContext::new(project_id)
                }
            },
            Err(_) => PlanningContext::new(project_id),
        }
    }

    fn persist(&self, context: &PlanningContext) -> Result<()> {
        let path = self.path_for(&context.project_id);
        atomic_write_json(&path, context)
    }

    /// Evict the least-recently-touched entry, flushing it to disk first.
    /// Caller must already hold the cache write lock.
    fn evict_one_locked(&self, cache: &mut HashMap<String, CacheEntry>) -> Result<()> {
        if let Some(victim) = cache.iter().min_by_key(|(_, e)| e.touched_at).map(|(k, _)| k.clone()) {
            if let Some(entry) = cache.remove(&victim) {
                self.persist(&entry.context)?;
                debug!(project_id = %victim, "evicted planning context from cache");
            }
        }
        Ok(())
    }

    fn with_context_mut<R>(&self, project_id: &str, f: impl FnOnce(&mut PlanningContext) -> R) -> Result<R> {
        let mut cache = self.cache.write().expect("context cache poisoned");
        if !cache.contains_key(project_id) {
            if cache.len() >= self.max_cached_contexts {
                self.evict_one_locked(&mut cache)?;
            }
            let context = self.load_from_disk(project_id);
            cache.insert(project_id.to_string(), CacheEntry { context, touched_at: now_ms(), dirty: false });
        }
        let entry = cache.get_mut(project_id).expect("just inserted");
        entry.touched_at = now_ms();
        entry.context.last_accessed_at = entry.touched_at;
        let result = f(&mut entry.context);
        entry.dirty = true;
        drop(cache);
        self.writer.signal();
        Ok(result)
    }

    fn with_context<R>(&self, project_id: &str, f: impl FnOnce(&PlanningContext) -> R) -> Result<R> {
        self.with_context_mut(project_id, |ctx| f(ctx))
    }

    pub fn register_agent(&self, project_id: &str, agent_id: &str, task_id: &str, agent_type: &str) -> Result<()> {
        self.with_context_mut(project_id, |ctx| {
            ctx.active_agents.insert(
                agent_id.to_string(),
                ActiveAgent {
                    task_id: task_id.to_string(),
                    agent_type: agent_type.to_string(),
                    registered_at: now_ms(),
                    files_hint: Vec::new(),
                },
            );
        })
    }

    pub fn set_files_hint(&self, project_id: &str, agent_id: &str, files: Vec<String>) -> Result<()> {
        self.with_context_mut(project_id, |ctx| {
            if let Some(agent) = ctx.active_agents.get_mut(agent_id) {
                agent.files_hint = files;
            }
        })
    }

    pub fn unregister_agent(&self, project_id: &str, agent_id: &str, insight: PlanningInsight) -> Result<()> {
        self.with_context_mut(project_id, |ctx| {
            ctx.active_agents.remove(agent_id);
            ctx.push_insight(insight);
        })?;
        info!(project_id, agent_id, "agent unregistered from shared planning context");
        Ok(())
    }

    pub fn is_file_in_use(&self, project_id: &str, file: &str) -> Result<bool> {
        self.with_context(project_id, |ctx| ctx.active_agents.values().any(|a| a.files_hint.iter().any(|f| f == file)))
    }

    pub fn files_in_use(&self, project_id: &str) -> Result<Vec<String>> {
        self.with_context(project_id, |ctx| {
            let mut files: Vec<String> =
                ctx.active_agents.values().flat_map(|a| a.files_hint.iter().cloned()).collect();
            files.sort();
            files.dedup();
            files
        })
    }

    /// Most recent `max` insights for `agent_type` in this project, newest first.
    pub fn similar_task_insights(&self, project_id: &str, agent_type: &str, max: usize) -> Result<Vec<PlanningInsight>> {
        self.with_context(project_id, |ctx| {
            ctx.insights
                .iter()
                .rev()
                .filter(|i| i.agent_type == agent_type)
                .take(max)
                .cloned()
                .collect()
        })
    }

    /// Same, but scanning every currently cached project except `exclude`.
    /// Projects evicted from the cache are not consulted - this is a
    /// best-effort cross-project prime, not an exhaustive one.
    pub fn cross_project_insights(&self, exclude_project_id: &str, agent_type: &str, max: usize) -> Vec<PlanningInsight> {
        let cache = self.cache.read().expect("context cache poisoned");
        let mut insights: Vec<PlanningInsight> = cache
            .iter()
            .filter(|(id, _)| id.as_str() != exclude_project_id)
            .flat_map(|(_, e)| e.context.insights.iter().cloned())
            .filter(|i| i.agent_type == agent_type)
            .collect();
        insights.sort_by_key(|i| std::cmp::Reverse(i.timestamp));
        insights.truncate(max);
        insights
    }

    pub fn project_statistics(&self, project_id: &str) -> Result<ProjectStatistics> {
        self.with_context(project_id, |ctx| {
            let task_count = ctx.insights.len();
            if task_count == 0 {
                return ProjectStatistics::default();
            }
            let successes = ctx.insights.iter().filter(|i| i.success).count();
            let total_duration: f64 = ctx.insights.iter().map(|i| i.duration_seconds).sum();
            let total_steps: f64 = ctx.insights.iter().map(|i| i.step_count as f64).sum();
            let total_iterations: f64 = ctx.insights.iter().map(|i| i.total_iterations as f64).sum();
            ProjectStatistics {
                task_count,
                success_rate: successes as f64 / task_count as f64,
                avg_duration_seconds: total_duration / task_count as f64,
                avg_step_count: total_steps / task_count as f64,
                avg_iterations: total_iterations / task_count as f64,
                stuck_kobolds: 0,
            }
        })
    }

    /// Flush every cached context to disk unconditionally, bypassing the
    /// debounced writer. Called on daemon shutdown.
    pub fn persist_all(&self) -> Result<()> {
        let mut cache = self.cache.write().expect("context cache poisoned");
        for entry in cache.values_mut() {
            self.persist(&entry.context)?;
            entry.dirty = false;
        }
        debug!(count = cache.len(), "persisted all cached planning contexts");
        Ok(())
    }

    pub fn cached_project_ids(&self) -> Vec<String> {
        self.cache.read().expect("context cache poisoned").keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insight(agent_type: &str, success: bool) -> PlanningInsight {
        PlanningInsight {
            task_id: "t1".into(),
            agent_type: agent_type.into(),
            timestamp: now_ms(),
            success,
            duration_seconds: 1.0,
            step_count: 3,
            completed_steps: 3,
            total_iterations: 5,
            files_modified: vec![],
            files_created: vec![],
            error_message: None,
        }
    }

    #[tokio::test]
    async fn file_in_use_tracks_registration_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::open(dir.path()).unwrap();
        store.register_agent("p1", "agent-a", "t1", "backend").unwrap();
        store.set_files_hint("p1", "agent-a", vec!["src/api/users.ts".into()]).unwrap();
        store.register_agent("p1", "agent-b", "t2", "backend").unwrap();
        store.set_files_hint("p1", "agent-b", vec!["src/api/users.ts".into()]).unwrap();

        assert!(store.is_file_in_use("p1", "src/api/users.ts").unwrap());

        store.unregister_agent("p1", "agent-a", insight("backend", true)).unwrap();
        assert!(store.is_file_in_use("p1", "src/api/users.ts").unwrap());

        store.unregister_agent("p1", "agent-b", insight("backend", true)).unwrap();
        assert!(!store.is_file_in_use("p1", "src/api/users.ts").unwrap());
    }

    #[tokio::test]
    async fn insights_capped_at_max() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::open(dir.path()).unwrap();
        for i in 0..(MAX_INSIGHTS + 10) {
            store.unregister_agent("p1", &format!("agent-{i}"), insight("backend", true)).unwrap();
        }
        let stats = store.project_statistics("p1").unwrap();
        assert_eq!(stats.task_count, MAX_INSIGHTS);
    }

    #[tokio::test]
    async fn eviction_flushes_before_dropping() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::open(dir.path()).unwrap();
        for i in 0..(MAX_CACHED_CONTEXTS + 5) {
            store.register_agent(&format!("proj-{i}"), "agent", "t1", "backend").unwrap();
        }
        assert!(store.cached_project_ids().len() <= MAX_CACHED_CONTEXTS);
        // The first project was evicted but its file should exist on disk.
        assert!(dir.path().join("proj-0").join("planning-context.json").exists());
    }

    #[tokio::test]
    async fn persist_all_flushes_dirty_entries_without_waiting_for_debounce() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::open(dir.path()).unwrap();
        store.register_agent("p1", "agent-a", "t1", "backend").unwrap();

        store.persist_all().unwrap();

        assert!(dir.path().join("p1").join("planning-context.json").exists());
    }
}
