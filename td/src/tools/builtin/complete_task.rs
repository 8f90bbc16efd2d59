//! complete_task tool - signal task completion without waiting for end_turn (§4.2)

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::tools::{Tool, ToolContext, ToolResult};

pub struct CompleteTaskTool;

#[async_trait]
impl Tool for CompleteTaskTool {
    fn name(&self) -> &'static str {
        "complete_task"
    }

    fn description(&self) -> &'static str {
        "Signal that the current task is complete. Use when validation passes and work is done."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "Brief summary of what was accomplished"
                },
                "artifacts": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "List of files created or modified"
                }
            },
            "required": ["summary"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let summary = match input.get("summary").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::error("Missing required parameter: summary"),
        };

        let artifacts: Vec<String> = input
            .get("artifacts")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        tracing::info!(task_id = %ctx.task_id, summary = %summary, artifacts = ?artifacts, "task completion signaled");

        let mut message = format!("Task completed: {summary}");
        if !artifacts.is_empty() {
            message.push_str("\n\nArtifacts:\n");
            for artifact in &artifacts {
                message.push_str(&format!("  - {artifact}\n"));
            }
        }

        // The agent loop watches for a call to this tool and ends the turn on
        // sight; it doesn't wait for end_turn from the model.
        ToolResult::success(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reports_summary_and_artifacts() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "task".to_string());

        let result = CompleteTaskTool
            .execute(json!({"summary": "Added module", "artifacts": ["src/module.rs"]}), &ctx)
            .await;

        assert!(!result.is_error);
        assert!(result.content.contains("Added module"));
        assert!(result.content.contains("src/module.rs"));
    }

    #[tokio::test]
    async fn missing_summary_is_an_error() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "task".to_string());

        let result = CompleteTaskTool.execute(json!({}), &ctx).await;

        assert!(result.is_error);
    }
}
