//! IPC listener: the daemon side of the Unix domain socket protocol.
//!
//! `serve` loops accepting connections and dispatching each request to a
//! [`DaemonRequestHandler`] the caller supplies - the listener itself knows
//! nothing about projects, workers, or metrics, only the wire protocol.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use super::messages::{DaemonRequest, DaemonResponse};

const MAX_MESSAGE_SIZE: usize = 1 << 20;

/// Implemented by whatever assembles the running daemon (scheduler +
/// project repository + prompt broker); `serve` is transport plumbing only.
#[async_trait]
pub trait DaemonRequestHandler: Send + Sync {
    async fn handle(&self, request: DaemonRequest) -> DaemonResponse;
}

pub fn create_listener_at(socket_path: &Path) -> Result<(UnixListener, PathBuf)> {
    debug!(?socket_path, "ipc listener: creating socket");

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create socket directory")?;
    }
    if socket_path.exists() {
        debug!(?socket_path, "ipc listener: removing stale socket");
        std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
    }

    let listener = UnixListener::bind(socket_path).context("failed to bind IPC socket")?;
    Ok((listener, socket_path.to_path_buf()))
}

pub fn cleanup_socket(socket_path: &Path) {
    if socket_path.exists() {
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!(?socket_path, error = %e, "ipc listener: failed to remove socket file");
        }
    }
}

/// Accepts connections on `listener` and dispatches each to `handler` until
/// `shutdown` fires. One request per connection.
pub async fn serve(listener: UnixListener, handler: impl DaemonRequestHandler + 'static, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let Ok((stream, _)) = accepted else { continue };
                if let Err(e) = handle_connection(stream, &handler).await {
                    warn!(error = %e, "ipc listener: connection failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!("ipc listener: shutdown signal received");
                    break;
                }
            }
        }
    }
}

async fn handle_connection(mut stream: UnixStream, handler: &impl DaemonRequestHandler) -> Result<()> {
    let request = read_request(&mut stream).await?;
    let response = handler.handle(request).await;
    send_response(&mut stream, response).await
}

async fn read_request(stream: &mut UnixStream) -> Result<DaemonRequest> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await.context("failed to read IPC request")?;

    if bytes_read > MAX_MESSAGE_SIZE {
        return Err(eyre::eyre!("request too large: {bytes_read} bytes"));
    }
    if line.trim().is_empty() {
        return Err(eyre::eyre!("empty request received"));
    }

    serde_json::from_str(line.trim()).context("failed to parse IPC request")
}

async fn send_response(stream: &mut UnixStream, response: DaemonResponse) -> Result<()> {
    let response_json = serde_json::to_string(&response).context("failed to serialize response")?;
    stream.write_all(response_json.as_bytes()).await.context("failed to write response")?;
    stream.write_all(b"\n").await.context("failed to write newline")?;
    stream.flush().await.context("failed to flush response")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::client::DaemonClient;
    use crate::ipc::messages::DaemonMetrics;
    use std::time::Duration;
    use tempfile::TempDir;

    struct EchoHandler;

    #[async_trait]
    impl DaemonRequestHandler for EchoHandler {
        async fn handle(&self, request: DaemonRequest) -> DaemonResponse {
            match request {
                DaemonRequest::Ping => DaemonResponse::Pong { version: "test".to_string() },
                DaemonRequest::Status => DaemonResponse::Status(DaemonMetrics { active_kobolds: 2, ..Default::default() }),
                _ => DaemonResponse::Error { message: "unsupported in test".to_string() },
            }
        }
    }

    #[tokio::test]
    async fn create_listener_creates_parent_dir() {
        let temp = TempDir::new().unwrap();
        let socket_path = temp.path().join("subdir").join("daemon.sock");
        let (_, path) = create_listener_at(&socket_path).unwrap();
        assert_eq!(path, socket_path);
        assert!(socket_path.exists());
    }

    #[tokio::test]
    async fn create_listener_removes_stale_socket() {
        let temp = TempDir::new().unwrap();
        let socket_path = temp.path().join("daemon.sock");
        std::fs::write(&socket_path, "stale").unwrap();
        assert!(create_listener_at(&socket_path).is_ok());
    }

    #[test]
    fn cleanup_socket_removes_file_and_tolerates_missing() {
        let temp = TempDir::new().unwrap();
        let socket_path = temp.path().join("daemon.sock");
        std::fs::write(&socket_path, "test").unwrap();
        cleanup_socket(&socket_path);
        assert!(!socket_path.exists());
        cleanup_socket(&socket_path);
    }

    #[tokio::test]
    async fn end_to_end_ping_and_status() {
        let temp = TempDir::new().unwrap();
        let socket_path = temp.path().join("daemon.sock");
        let (listener, _) = create_listener_at(&socket_path).unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let server = tokio::spawn(serve(listener, EchoHandler, shutdown_rx));

        tokio::time::sleep(Duration::from_millis(10)).await;

        let client = DaemonClient::with_socket_path(socket_path);
        assert_eq!(client.ping().await.unwrap(), "test");
        let metrics = client.status().await.unwrap();
        assert_eq!(metrics.active_kobolds, 2);

        let _ = shutdown_tx.send(true);
        server.abort();
    }
}
