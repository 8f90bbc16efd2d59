//! Session event log (§6.5): persists one Dragon session's event stream to
//! `<runs_dir>/<session_id>/events.jsonl` for history and replay.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::types::DragonEvent;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEventEntry {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub event: DragonEvent,
}

impl SessionEventEntry {
    fn new(event: DragonEvent) -> Self {
        Self { timestamp: Utc::now(), event }
    }
}

/// Spawns a task that drains `rx` and appends each event as a JSON line
/// under `runs_dir/session_id/events.jsonl`, exiting once the channel
/// closes (the session ended).
pub fn spawn_session_event_log(
    runs_dir: impl AsRef<Path>,
    session_id: impl Into<String>,
    mut rx: mpsc::UnboundedReceiver<DragonEvent>,
) -> eyre::Result<tokio::task::JoinHandle<()>> {
    let session_dir = runs_dir.as_ref().join(session_id.into());
    fs::create_dir_all(&session_dir)?;
    let log_path = session_dir.join("events.jsonl");

    Ok(tokio::spawn(async move {
        let mut file = match OpenOptions::new().create(true).append(true).open(&log_path) {
            Ok(f) => f,
            Err(e) => {
                warn!(?log_path, error = %e, "session event log: failed to open log file");
                return;
            }
        };
        while let Some(event) = rx.recv().await {
            let entry = SessionEventEntry::new(event);
            match serde_json::to_string(&entry) {
                Ok(json) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        warn!(error = %e, "session event log: failed to write event");
                    }
                }
                Err(e) => warn!(error = %e, "session event log: failed to serialize event"),
            }
        }
        debug!(?log_path, "session event log: channel closed, stopping");
    }))
}

/// Replays a session's logged events in order, for `td project show`-style
/// inspection or debugging a finished session.
pub fn read_session_events(runs_dir: impl AsRef<Path>, session_id: &str) -> eyre::Result<Vec<SessionEventEntry>> {
    let log_path = runs_dir.as_ref().join(session_id).join("events.jsonl");
    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&log_path)?;
    let mut entries = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SessionEventEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line, error = %e, "read_session_events: failed to parse line"),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn logs_events_in_order_and_stops_on_close() {
        let dir = tempdir().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_session_event_log(dir.path(), "session-1", rx).unwrap();

        tx.send(DragonEvent::AssistantText("hello".into())).unwrap();
        tx.send(DragonEvent::SpecificationCreated { project_id: "p1".into() }).unwrap();
        drop(tx);
        handle.await.unwrap();

        let entries = read_session_events(dir.path(), "session-1").unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0].event, DragonEvent::AssistantText(_)));
        assert!(matches!(entries[1].event, DragonEvent::SpecificationCreated { .. }));
    }

    #[test]
    fn reading_an_unlogged_session_is_empty() {
        let dir = tempdir().unwrap();
        let entries = read_session_events(dir.path(), "never-ran").unwrap();
        assert!(entries.is_empty());
    }
}
