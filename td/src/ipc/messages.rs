//! IPC message types for CLI <-> daemon communication (§4.14).
//!
//! Simple JSON-over-newline protocol: each message is one line of JSON
//! followed by `\n`. The daemon process (`td run`) is the listener; every
//! other CLI invocation (`status`, `project list|show`, `verify`) is a
//! short-lived client.

use serde::{Deserialize, Serialize};

/// Requests a CLI invocation can send to a running daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum DaemonRequest {
    /// Check if the daemon is alive and get its version.
    Ping,
    /// `status`: daemon-wide metrics.
    Status,
    /// `project list`.
    ProjectList,
    /// `project show <name>`.
    ProjectShow { name: String },
    /// `verify <name>`: force a verification cycle outside its timer.
    Verify { name: String },
    /// Request the daemon stop gracefully.
    Shutdown,
}

/// Snapshot of daemon-wide activity (§3.3), printed by `status` as JSON or
/// a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DaemonMetrics {
    pub active_kobolds: usize,
    pub active_drakes: usize,
    pub pending_prompts: usize,
    pub cycles_run: u64,
    pub cycles_skipped: u64,
}

/// One row of `project list` / the payload of `project show`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    pub task_count: usize,
    pub tasks_done: usize,
}

/// Responses from daemon to CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum DaemonResponse {
    Pong { version: String },
    Status(DaemonMetrics),
    Projects(Vec<ProjectSummary>),
    Project(ProjectSummary),
    Ok,
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrips() {
        let requests = vec![
            DaemonRequest::Ping,
            DaemonRequest::Status,
            DaemonRequest::ProjectList,
            DaemonRequest::ProjectShow { name: "todo-app".into() },
            DaemonRequest::Verify { name: "todo-app".into() },
            DaemonRequest::Shutdown,
        ];
        for req in requests {
            let json = serde_json::to_string(&req).unwrap();
            let parsed: DaemonRequest = serde_json::from_str(&json).unwrap();
            assert_eq!(req, parsed);
        }
    }

    #[test]
    fn response_roundtrips() {
        let responses = vec![
            DaemonResponse::Pong { version: "1.0.0".into() },
            DaemonResponse::Status(DaemonMetrics { active_kobolds: 3, ..Default::default() }),
            DaemonResponse::Projects(vec![ProjectSummary {
                id: "p1".into(),
                name: "Todo".into(),
                status: "InProgress".into(),
                task_count: 5,
                tasks_done: 2,
            }]),
            DaemonResponse::Ok,
            DaemonResponse::Error { message: "no such project".into() },
        ];
        for resp in responses {
            let json = serde_json::to_string(&resp).unwrap();
            let parsed: DaemonResponse = serde_json::from_str(&json).unwrap();
            assert_eq!(resp, parsed);
        }
    }
}
