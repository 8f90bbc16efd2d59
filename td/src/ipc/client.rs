//! IPC client for CLI invocations to talk to a running daemon.

use std::path::PathBuf;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use super::get_socket_path;
use super::messages::{DaemonMetrics, DaemonRequest, DaemonResponse, ProjectSummary};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_MESSAGE_SIZE: usize = 1 << 20;

#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonClient {
    pub fn new() -> Self {
        Self { socket_path: get_socket_path(), timeout: DEFAULT_TIMEOUT }
    }

    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self { socket_path, timeout: DEFAULT_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    pub async fn ping(&self) -> Result<String> {
        match self.send(DaemonRequest::Ping).await? {
            DaemonResponse::Pong { version } => Ok(version),
            other => Err(unexpected(other)),
        }
    }

    pub async fn status(&self) -> Result<DaemonMetrics> {
        match self.send(DaemonRequest::Status).await? {
            DaemonResponse::Status(metrics) => Ok(metrics),
            other => Err(unexpected(other)),
        }
    }

    pub async fn project_list(&self) -> Result<Vec<ProjectSummary>> {
        match self.send(DaemonRequest::ProjectList).await? {
            DaemonResponse::Projects(projects) => Ok(projects),
            other => Err(unexpected(other)),
        }
    }

    pub async fn project_show(&self, name: &str) -> Result<ProjectSummary> {
        match self.send(DaemonRequest::ProjectShow { name: name.to_string() }).await? {
            DaemonResponse::Project(project) => Ok(project),
            other => Err(unexpected(other)),
        }
    }

    pub async fn verify(&self, name: &str) -> Result<()> {
        match self.send(DaemonRequest::Verify { name: name.to_string() }).await? {
            DaemonResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        match self.send(DaemonRequest::Shutdown).await? {
            DaemonResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn send(&self, request: DaemonRequest) -> Result<DaemonResponse> {
        debug!(?self.socket_path, ?request, "daemon client: sending request");
        let stream = tokio::time::timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("connection timeout")?
            .context("failed to connect to daemon socket")?;
        self.send_on_stream(stream, request).await
    }

    async fn send_on_stream(&self, mut stream: UnixStream, request: DaemonRequest) -> Result<DaemonResponse> {
        let request_json = serde_json::to_string(&request).context("failed to serialize request")?;
        if request_json.len() > MAX_MESSAGE_SIZE {
            return Err(eyre::eyre!("request too large: {} bytes", request_json.len()));
        }

        tokio::time::timeout(self.timeout, async {
            stream.write_all(request_json.as_bytes()).await.context("failed to write request")?;
            stream.write_all(b"\n").await.context("failed to write newline")?;
            stream.flush().await.context("failed to flush stream")?;
            Ok::<_, eyre::Error>(())
        })
        .await
        .context("write timeout")??;

        let mut reader = BufReader::new(&mut stream);
        let mut response_line = String::new();
        tokio::time::timeout(self.timeout, reader.read_line(&mut response_line)).await.context("read timeout")?.context("failed to read response")?;

        let response: DaemonResponse = serde_json::from_str(response_line.trim()).context("failed to parse daemon response")?;
        debug!(?response, "daemon client: received response");
        Ok(response)
    }
}

fn unexpected(response: DaemonResponse) -> eyre::Error {
    match response {
        DaemonResponse::Error { message } => eyre::eyre!("daemon error: {message}"),
        other => eyre::eyre!("unexpected daemon response: {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_point_at_the_standard_socket() {
        let client = DaemonClient::default();
        assert!(client.socket_path.ends_with("daemon.sock"));
    }

    #[test]
    fn custom_socket_path_and_timeout_are_honored() {
        let path = PathBuf::from("/custom/path/daemon.sock");
        let client = DaemonClient::with_socket_path(path.clone()).with_timeout(Duration::from_secs(10));
        assert_eq!(client.socket_path, path);
        assert_eq!(client.timeout, Duration::from_secs(10));
    }

    #[test]
    fn socket_exists_false_for_missing_socket() {
        let temp = TempDir::new().unwrap();
        let client = DaemonClient::with_socket_path(temp.path().join("nonexistent.sock"));
        assert!(!client.socket_exists());
    }
}
