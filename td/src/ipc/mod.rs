//! Inter-process communication for the CLI surface (§4.14).
//!
//! `td run` hosts the only long-lived process; `status`, `project
//! list|show`, and `verify` are short-lived CLI invocations that reach it
//! over a Unix domain socket with a JSON-over-newline protocol.

use std::path::PathBuf;

pub mod client;
pub mod listener;
pub mod messages;

pub use client::DaemonClient;
pub use listener::{DaemonRequestHandler, cleanup_socket, create_listener_at, serve};
pub use messages::{DaemonMetrics, DaemonRequest, DaemonResponse, ProjectSummary};

/// Socket path, alongside the daemon's other runtime files (PID file,
/// version file).
pub fn get_socket_path() -> PathBuf {
    dirs::runtime_dir().or_else(dirs::data_local_dir).unwrap_or_else(|| PathBuf::from("/tmp")).join("forgecore").join("daemon.sock")
}
