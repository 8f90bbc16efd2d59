//! Filesystem-backed [`TaskFileSink`]: the concrete writer Drake's debounced
//! writer flushes through, plus the startup read that (re)loads an existing
//! task file.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use eyre::Context;

use crate::agent::TaskFileSink;
use crate::domain::Task;

use super::task_file::{self, ParsedTaskFile};

/// One Drake's task file on disk. Remembers the preamble captured at load
/// time so re-writes never clobber hand-authored notes above the table.
pub struct TaskFileStore {
    path: PathBuf,
    preamble: Mutex<String>,
}

impl TaskFileStore {
    /// Reads and parses an existing task file, returning the store plus the
    /// tasks it reconciles against `known`. A missing file starts fresh with
    /// an empty preamble. Per §4.5, a malformed *existing* file is a hard
    /// error - Drake must never silently overwrite user edits.
    pub fn load(path: impl AsRef<Path>, known: &[Task]) -> eyre::Result<(Self, Vec<Task>)> {
        let path = path.as_ref().to_path_buf();
        let (preamble, tasks) = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let ParsedTaskFile { preamble, rows } =
                    task_file::parse(&content).with_context(|| format!("parsing existing task file {}", path.display()))?;
                (preamble, task_file::merge_rows_into_tasks(known, &rows))
            }
            Err(_) => (String::new(), known.to_vec()),
        };
        Ok((Self { path, preamble: Mutex::new(preamble) }, tasks))
    }
}

#[async_trait]
impl TaskFileSink for TaskFileStore {
    async fn write(&self, path: &str, tasks: &[Task]) -> eyre::Result<()> {
        let preamble = self.preamble.lock().expect("preamble lock poisoned").clone();
        let rendered = task_file::render(&preamble, &task_file::rows_from_tasks(tasks));
        let target = if path.is_empty() { self.path.clone() } else { PathBuf::from(path) };
        taskstore::atomic_write(&target, rendered.as_bytes()).with_context(|| format!("writing task file {}", target.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStatus;
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_then_reloads_preserving_preamble() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("area-a-tasks.md");
        std::fs::write(&path, "# Area A\n\n| id | description | status | assignee |\n|---|---|---|---|\n").unwrap();

        let mut t = Task::new("t1", "do the thing", "spec-1");
        t.status = TaskStatus::Unassigned;
        let (store, tasks) = TaskFileStore::load(&path, &[t.clone()]).unwrap();
        assert_eq!(tasks.len(), 0); // file had no rows yet, nothing to reconcile

        store.write(path.to_str().unwrap(), &[t]).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Area A"));
        assert!(content.contains("| t1 |"));
    }

    #[test]
    fn missing_file_starts_with_known_tasks_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("does-not-exist.md");
        let t = Task::new("t1", "do the thing", "spec-1");
        let (_store, tasks) = TaskFileStore::load(&path, &[t]).unwrap();
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn malformed_existing_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad-tasks.md");
        std::fs::write(&path, "| id | desc | state | owner |\n|---|---|---|---|\n").unwrap();
        assert!(TaskFileStore::load(&path, &[]).is_err());
    }
}
