use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("path {path:?} escapes the sandbox rooted at {workspace:?}")]
    SandboxViolation { path: PathBuf, workspace: PathBuf },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid tool input: {0}")]
    InvalidInput(String),
}
