//! Drake supervisor (§4.5): owns one task file, summons Kobolds against its
//! tasks, and mirrors their terminal status back into the task rows.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use taskstore::DebouncedWriter;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::{DrakeInfo, Kobold, KoboldStatus, Task, TaskStatus, UNASSIGNED_ASSIGNEE};

const WRITE_DEBOUNCE: Duration = Duration::from_secs(2);
const DEFAULT_STUCK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Serializes a Drake's task tracker back to its markdown task file.
/// Implemented by `crate::state::task_file`; kept as a trait so this module
/// doesn't depend on the storage layer directly.
#[async_trait]
pub trait TaskFileSink: Send + Sync {
    async fn write(&self, path: &str, tasks: &[Task]) -> eyre::Result<()>;
}

/// A live worker summoned against one of this Drake's tasks.
struct Summoned {
    kobold: Kobold,
}

pub struct DrakeSupervisor {
    pub info: DrakeInfo,
    tasks: Arc<Mutex<HashMap<String, Task>>>,
    kobolds: Mutex<HashMap<String, Summoned>>,
    writer: DebouncedWriter,
}

impl DrakeSupervisor {
    pub fn new(info: DrakeInfo, tasks: Vec<Task>, sink: Arc<dyn TaskFileSink>) -> Self {
        let path = info.task_file_path.clone();
        let tasks: HashMap<String, Task> = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        let tasks = Arc::new(Mutex::new(tasks));

        let flush_tasks = tasks.clone();
        let flush_path = path.clone();
        let flush_sink = sink;
        let writer = DebouncedWriter::spawn(
            WRITE_DEBOUNCE,
            Box::new(move || {
                let tasks = flush_tasks.clone();
                let path = flush_path.clone();
                let sink = flush_sink.clone();
                Box::pin(async move {
                    let rows: Vec<Task> = tasks.lock().await.values().cloned().collect();
                    sink.write(&path, &rows).await
                })
            }),
        );

        Self { info, tasks, kobolds: Mutex::new(HashMap::new()), writer }
    }

    /// `SummonKobold(task, agentType) -> koboldId`.
    pub async fn summon_kobold(&mut self, task_id: &str, agent_type: &str) -> Option<String> {
        let mut kobold = Kobold::new(agent_type);
        kobold.assign_task(task_id).ok()?;
        let kobold_id = kobold.id.clone();

        {
            let mut tasks = self.tasks.lock().await;
            let task = tasks.get_mut(task_id)?;
            task.assignee = kobold_id.clone();
            task.assigned_agent_type = agent_type.to_string();
            task.status = TaskStatus::Working;
        }

        self.info.workers.insert(task_id.to_string(), kobold_id.clone());
        self.kobolds.lock().await.insert(kobold_id.clone(), Summoned { kobold });
        self.writer.signal();

        info!(drake = %self.info.name, %task_id, %kobold_id, "drake: summoned kobold");
        Some(kobold_id)
    }

    /// `SyncTaskFromKobold`: mirrors a just-finished Kobold's terminal
    /// status into its task row. Called by the caller after it has awaited
    /// the Kobold's `start_work` future.
    pub async fn sync_task_from_kobold(&mut self, kobold_id: &str, succeeded: bool) {
        let task_id = {
            let kobolds = self.kobolds.lock().await;
            kobolds.get(kobold_id).and_then(|s| s.kobold.task_id.clone())
        };
        let Some(task_id) = task_id else { return };

        {
            let mut tasks = self.tasks.lock().await;
            if let Some(task) = tasks.get_mut(&task_id) {
                task.status = if succeeded { TaskStatus::Done } else { TaskStatus::Failed };
            }
        }

        self.writer.signal();
    }

    /// `MonitorTasks`: idempotent status mirror for every mapped pair.
    pub async fn monitor_tasks(&mut self) {
        let kobolds = self.kobolds.lock().await;
        let mut tasks = self.tasks.lock().await;
        for (task_id, kobold_id) in &self.info.workers {
            let Some(summoned) = kobolds.get(kobold_id) else { continue };
            let Some(task) = tasks.get_mut(task_id) else { continue };
            task.status = match summoned.kobold.status {
                KoboldStatus::Unassigned | KoboldStatus::Assigned => task.status,
                KoboldStatus::Working => TaskStatus::Working,
                KoboldStatus::Done if summoned.kobold.is_success() => TaskStatus::Done,
                KoboldStatus::Done => TaskStatus::Failed,
            };
        }
    }

    /// `HandleStuckKobolds(timeout)`: the one place a supervisor mutates
    /// task state without waiting for worker confirmation.
    pub async fn handle_stuck_kobolds(&mut self, timeout: Duration) {
        let now = taskstore::now_ms();
        let timeout_ms = timeout.as_millis() as i64;
        let mut stuck = Vec::new();

        {
            let kobolds = self.kobolds.lock().await;
            for (id, summoned) in kobolds.iter() {
                if summoned.kobold.status == KoboldStatus::Working
                    && let Some(started_at) = summoned.kobold.started_at
                    && now - started_at > timeout_ms
                {
                    stuck.push((id.clone(), summoned.kobold.task_id.clone()));
                }
            }
        }

        if stuck.is_empty() {
            return;
        }

        let mut tasks = self.tasks.lock().await;
        for (kobold_id, task_id) in stuck {
            warn!(drake = %self.info.name, %kobold_id, "drake: unbinding stuck kobold");
            if let Some(task_id) = task_id
                && let Some(task) = tasks.get_mut(&task_id)
            {
                task.description = format!("{} timeout after {} minutes", task.description, timeout.as_secs() / 60);
                task.status = TaskStatus::Failed;
                task.assignee = UNASSIGNED_ASSIGNEE.to_string();
            }
            self.info.workers.retain(|_, v| v != &kobold_id);
            self.kobolds.lock().await.remove(&kobold_id);
        }
        drop(tasks);
        self.writer.signal();
    }

    /// `UnsummonCompletedKobolds`.
    pub async fn unsummon_completed_kobolds(&mut self) {
        let mut kobolds = self.kobolds.lock().await;
        let done: Vec<String> = kobolds.iter().filter(|(_, s)| s.kobold.is_complete()).map(|(id, _)| id.clone()).collect();
        for id in done {
            kobolds.remove(&id);
            self.info.workers.retain(|_, v| v != &id);
        }
    }

    pub async fn task(&self, task_id: &str) -> Option<Task> {
        self.tasks.lock().await.get(task_id).cloned()
    }

    /// Fetches a summoned Kobold's current value, for a caller that needs to
    /// drive its `start_work` loop outside this supervisor (the periodic
    /// worker owns that future; this supervisor only tracks the mapping).
    pub async fn kobold(&self, kobold_id: &str) -> Option<Kobold> {
        self.kobolds.lock().await.get(kobold_id).map(|s| s.kobold.clone())
    }

    pub async fn tasks_snapshot(&self) -> Vec<Task> {
        self.tasks.lock().await.values().cloned().collect()
    }

    pub async fn insert_kobold(&self, kobold: Kobold) {
        self.kobolds.lock().await.insert(kobold.id.clone(), Summoned { kobold });
    }

    pub async fn update_kobold(&self, kobold_id: &str, kobold: Kobold) {
        if let Some(slot) = self.kobolds.lock().await.get_mut(kobold_id) {
            slot.kobold = kobold;
        }
    }

    /// `UpdateTasksFile`: forces an immediate flush rather than waiting for
    /// the debounce window, used on shutdown.
    pub async fn flush(self) {
        self.writer.shutdown().await;
    }
}

pub fn default_stuck_timeout() -> Duration {
    DEFAULT_STUCK_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;

    struct NullSink;

    #[async_trait]
    impl TaskFileSink for NullSink {
        async fn write(&self, _path: &str, _tasks: &[Task]) -> eyre::Result<()> {
            Ok(())
        }
    }

    fn sample_task() -> Task {
        let mut t = Task::new("t1", "do the thing", "spec-1");
        t.priority = Priority::Medium;
        t
    }

    #[tokio::test]
    async fn summon_assigns_task_and_records_mapping() {
        let info = DrakeInfo::new("area-a", "tasks/area-a-tasks.md", "proj-1");
        let mut drake = DrakeSupervisor::new(info, vec![sample_task()], Arc::new(NullSink));

        let kobold_id = drake.summon_kobold("t1", "backend").await.unwrap();

        assert!(drake.info.workers.contains_key("t1"));
        let task = drake.task("t1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Working);
        assert_eq!(task.assignee, kobold_id);
    }

    #[tokio::test]
    async fn sync_task_from_kobold_marks_done_on_success() {
        let info = DrakeInfo::new("area-a", "tasks/area-a-tasks.md", "proj-1");
        let mut drake = DrakeSupervisor::new(info, vec![sample_task()], Arc::new(NullSink));
        let kobold_id = drake.summon_kobold("t1", "backend").await.unwrap();

        let mut kobold = Kobold::new("backend");
        kobold.assign_task("t1").unwrap();
        kobold.mark_started().unwrap();
        kobold.mark_done(None);
        drake.update_kobold(&kobold_id, kobold).await;

        drake.sync_task_from_kobold(&kobold_id, true).await;

        let task = drake.task("t1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn stuck_kobold_is_unbound_and_task_failed() {
        let info = DrakeInfo::new("area-a", "tasks/area-a-tasks.md", "proj-1");
        let mut drake = DrakeSupervisor::new(info, vec![sample_task()], Arc::new(NullSink));
        let kobold_id = drake.summon_kobold("t1", "backend").await.unwrap();

        let mut kobold = Kobold::new("backend");
        kobold.assign_task("t1").unwrap();
        kobold.mark_started().unwrap();
        kobold.started_at = Some(taskstore::now_ms() - Duration::from_secs(60 * 60).as_millis() as i64);
        drake.update_kobold(&kobold_id, kobold).await;

        drake.handle_stuck_kobolds(Duration::from_secs(30 * 60)).await;

        let task = drake.task("t1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.assignee, UNASSIGNED_ASSIGNEE);
        assert!(task.description.ends_with("timeout after 30 minutes"));
        assert!(!drake.info.workers.contains_key("t1"));
    }

    #[tokio::test]
    async fn unsummon_removes_only_done_kobolds() {
        let info = DrakeInfo::new("area-a", "tasks/area-a-tasks.md", "proj-1");
        let mut drake = DrakeSupervisor::new(info, vec![sample_task()], Arc::new(NullSink));
        let kobold_id = drake.summon_kobold("t1", "backend").await.unwrap();

        drake.unsummon_completed_kobolds().await;
        assert!(drake.info.workers.contains_key("t1"));

        let mut kobold = Kobold::new("backend");
        kobold.assign_task("t1").unwrap();
        kobold.mark_started().unwrap();
        kobold.mark_done(None);
        drake.update_kobold(&kobold_id, kobold).await;

        drake.unsummon_completed_kobolds().await;
        assert!(!drake.info.workers.contains_key("t1"));
    }
}
