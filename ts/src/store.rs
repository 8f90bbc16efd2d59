//! Generic persistent record store.
//!
//! Durability is a JSONL append log (`records.jsonl`, one line per put/delete);
//! queryability is a SQLite index (`index.db`) rebuilt from the log on open.
//! An in-process `RwLock<HashMap>` cache serves reads without touching disk.
//! A `fs2` advisory lock on the store directory keeps two processes from
//! opening the same store as writers at once.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use eyre::{Context, Result, eyre};
use fs2::FileExt;
use rusqlite::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::record::{Filter, IndexValue, Record};
use crate::time::now_ms;

#[derive(serde::Serialize, serde::Deserialize)]
enum LogOp<T> {
    Put(T),
    Delete(String),
}

#[derive(serde::Serialize, serde::Deserialize)]
struct LogEntry<T> {
    ts: i64,
    op: LogOp<T>,
}

/// A directory-backed collection of records of a single Rust type `T`.
///
/// `T` must implement [`Record`] plus the usual serde bounds. Each `Store`
/// owns one directory; multiple `Store<T>`s for different `T` can share a
/// parent directory by using distinct subdirectories (see `Store::open`).
pub struct Store<T> {
    dir: PathBuf,
    log_path: PathBuf,
    lock_file: File,
    cache: RwLock<HashMap<String, T>>,
    index: std::sync::Mutex<Connection>,
}

impl<T> Store<T>
where
    T: Record + Clone + Serialize + DeserializeOwned,
{
    /// Open (creating if absent) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("creating store dir {}", dir.display()))?;

        let lock_path = dir.join(".lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("opening lock file {}", lock_path.display()))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| eyre!("store at {} is already open for writing elsewhere", dir.display()))?;

        let log_path = dir.join("records.jsonl");
        let index_path = dir.join("index.db");
        let conn = Connection::open(&index_path).with_context(|| format!("opening index db {}", index_path.display()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS index_entries (id TEXT NOT NULL, field TEXT NOT NULL, value TEXT NOT NULL)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_field_value ON index_entries(field, value)",
            [],
        )?;

        let store = Self {
            dir,
            log_path,
            lock_file,
            cache: RwLock::new(HashMap::new()),
            index: std::sync::Mutex::new(conn),
        };
        store.rebuild_from_log()?;
        Ok(store)
    }

    fn rebuild_from_log(&self) -> Result<()> {
        if !self.log_path.exists() {
            return Ok(());
        }
        let f = File::open(&self.log_path)?;
        let reader = BufReader::new(f);
        let mut cache = self.cache.write().expect("cache lock poisoned");
        let mut count = 0usize;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: LogEntry<T> = match serde_json::from_str(&line) {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping malformed log line during replay");
                    continue;
                }
            };
            match entry.op {
                LogOp::Put(record) => {
                    cache.insert(record.id().to_string(), record);
                }
                LogOp::Delete(id) => {
                    cache.remove(&id);
                }
            }
            count += 1;
        }
        debug!(entries = count, records = cache.len(), dir = %self.dir.display(), "replayed store log");
        drop(cache);
        self.reindex_all()
    }

    fn reindex_all(&self) -> Result<()> {
        let cache = self.cache.read().expect("cache lock poisoned");
        let conn = self.index.lock().expect("index lock poisoned");
        conn.execute("DELETE FROM index_entries", [])?;
        for record in cache.values() {
            Self::write_index_entries(&conn, record)?;
        }
        Ok(())
    }

    fn write_index_entries(conn: &Connection, record: &T) -> Result<()> {
        conn.execute("DELETE FROM index_entries WHERE id = ?1", [record.id()])?;
        for (field, value) in record.indexed_fields() {
            conn.execute(
                "INSERT INTO index_entries (id, field, value) VALUES (?1, ?2, ?3)",
                rusqlite::params![record.id(), field, value.to_string()],
            )?;
        }
        Ok(())
    }

    fn append_log(&self, entry: &LogEntry<T>) -> Result<()> {
        let mut f = OpenOptions::new().create(true).append(true).open(&self.log_path)?;
        let line = serde_json::to_string(entry)?;
        writeln!(f, "{line}")?;
        f.sync_data()?;
        Ok(())
    }

    /// Insert or replace a record.
    pub fn put(&self, record: T) -> Result<()> {
        let entry = LogEntry { ts: now_ms(), op: LogOp::Put(record) };
        self.append_log(&entry)?;
        let LogEntry { op: LogOp::Put(record), .. } = entry else { unreachable!() };
        {
            let conn = self.index.lock().expect("index lock poisoned");
            Self::write_index_entries(&conn, &record)?;
        }
        self.cache.write().expect("cache lock poisoned").insert(record.id().to_string(), record);
        Ok(())
    }

    /// Remove a record by id. No-op if absent.
    pub fn delete(&self, id: &str) -> Result<()> {
        let entry: LogEntry<T> = LogEntry { ts: now_ms(), op: LogOp::Delete(id.to_string()) };
        self.append_log(&entry)?;
        self.index.lock().expect("index lock poisoned").execute("DELETE FROM index_entries WHERE id = ?1", [id])?;
        self.cache.write().expect("cache lock poisoned").remove(id);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.cache.read().expect("cache lock poisoned").get(id).cloned()
    }

    pub fn all(&self) -> Vec<T> {
        self.cache.read().expect("cache lock poisoned").values().cloned().collect()
    }

    /// Records matching every filter (conjunction). Filters evaluate against
    /// `Record::indexed_fields`, not the SQLite table, so arbitrary
    /// `IndexValue` comparisons beyond what SQL expresses are possible
    /// without extra index plumbing; the SQLite index exists to keep large
    /// stores from doing a full deserialize-and-scan on every query.
    pub fn query(&self, filters: &[Filter]) -> Vec<T> {
        if filters.is_empty() {
            return self.all();
        }
        let cache = self.cache.read().expect("cache lock poisoned");
        cache
            .values()
            .filter(|r| filters.iter().all(|f| f.matches(&r.indexed_fields())))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cache.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compact the log: rewrite it from the current in-memory cache so
    /// superseded puts/deletes stop being replayed on next open.
    pub fn compact(&self) -> Result<()> {
        let cache = self.cache.read().expect("cache lock poisoned");
        let tmp_path = self.log_path.with_extension("jsonl.compact");
        {
            let mut f = File::create(&tmp_path)?;
            for record in cache.values() {
                let entry = LogEntry { ts: now_ms(), op: LogOp::Put(record.clone()) };
                writeln!(f, "{}", serde_json::to_string(&entry)?)?;
            }
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &self.log_path)?;
        debug!(records = cache.len(), "compacted store log");
        Ok(())
    }
}

impl<T> Drop for Store<T> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock_file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::DynamicRecord;
    use serde_json::json;

    fn rec(id: &str, status: &str) -> DynamicRecord {
        DynamicRecord {
            id: id.to_string(),
            kind: "thing".to_string(),
            fields: json!({ "status": status }).as_object().unwrap().clone(),
        }
    }

    #[test]
    fn put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store: Store<DynamicRecord> = Store::open(dir.path()).unwrap();
        store.put(rec("a", "new")).unwrap();
        assert_eq!(store.get("a").unwrap().id, "a");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn query_filters_by_indexed_field() {
        let dir = tempfile::tempdir().unwrap();
        let store: Store<DynamicRecord> = Store::open(dir.path()).unwrap();
        store.put(rec("a", "new")).unwrap();
        store.put(rec("b", "done")).unwrap();
        let matches = store.query(&[Filter::eq("status", IndexValue::String("done".into()))]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "b");
    }

    #[test]
    fn delete_removes_from_cache_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store: Store<DynamicRecord> = Store::open(dir.path()).unwrap();
            store.put(rec("a", "new")).unwrap();
            store.delete("a").unwrap();
        }
        let reopened: Store<DynamicRecord> = Store::open(dir.path()).unwrap();
        assert!(reopened.get("a").is_none());
    }

    #[test]
    fn reopen_replays_log() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store: Store<DynamicRecord> = Store::open(dir.path()).unwrap();
            store.put(rec("a", "new")).unwrap();
            store.put(rec("b", "new")).unwrap();
        }
        let reopened: Store<DynamicRecord> = Store::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 2);
    }
}
