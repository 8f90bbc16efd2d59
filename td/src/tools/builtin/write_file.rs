//! write_file tool

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Create or overwrite a file with the given content."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path relative to the project workspace"},
                "content": {"type": "string", "description": "Full file content"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(path) = input["path"].as_str() else {
            return ToolResult::error("path is required");
        };
        let Some(content) = input["content"].as_str() else {
            return ToolResult::error("content is required");
        };

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if let Some(parent) = full_path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return ToolResult::error(format!("Failed to create parent directories: {e}"));
        }

        match tokio::fs::write(&full_path, content).await {
            Ok(()) => {
                ctx.track_read(&full_path).await;
                debug!(path = %path, len = content.len(), "WriteFileTool::execute: wrote file");
                ToolResult::success(format!("Wrote {} bytes to {path}", content.len()))
            }
            Err(e) => ToolResult::error(format!("Failed to write {path}: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_new_file_and_nested_directories() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "task".to_string());
        let result = WriteFileTool.execute(serde_json::json!({"path": "src/lib.rs", "content": "fn main() {}"}), &ctx).await;
        assert!(!result.is_error);
        let content = tokio::fs::read_to_string(temp.path().join("src/lib.rs")).await.unwrap();
        assert_eq!(content, "fn main() {}");
    }

    #[tokio::test]
    async fn rejects_path_outside_workspace() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "task".to_string());
        let result = WriteFileTool.execute(serde_json::json!({"path": "/etc/passwd", "content": "x"}), &ctx).await;
        assert!(result.is_error);
    }
}
