//! ask_user tool - request human input mid-task (§4.2, §4.10)

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::time::{Duration, timeout};

use crate::tools::{Tool, ToolContext, ToolResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const NO_RESPONSE_MARKER: &str = "(no response - timed out waiting for user input)";

/// Ask a human a question and wait for a reply, through whatever
/// `UserPrompter` the session wired in. The transport that actually shows the
/// prompt to a person is out of scope here.
pub struct AskUserTool;

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &'static str {
        "ask_user"
    }

    fn description(&self) -> &'static str {
        "Ask the user a question and wait for their reply. Use sparingly, only when you're blocked."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to ask the user"
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(question) = input.get("question").and_then(|v| v.as_str()) else {
            return ToolResult::error("question is required");
        };

        let Some(prompter) = &ctx.user_prompter else {
            return ToolResult::error("no user prompter configured for this task");
        };

        match timeout(DEFAULT_TIMEOUT, prompter.ask(question)).await {
            Ok(Some(answer)) => ToolResult::success(answer),
            Ok(None) => ToolResult::success(NO_RESPONSE_MARKER),
            Err(_) => ToolResult::success(NO_RESPONSE_MARKER),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct StaticPrompter(Option<&'static str>);

    #[async_trait]
    impl crate::tools::UserPrompter for StaticPrompter {
        async fn ask(&self, _prompt: &str) -> Option<String> {
            self.0.map(String::from)
        }
    }

    #[tokio::test]
    async fn returns_the_users_answer() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "task".to_string())
            .with_user_prompter(Arc::new(StaticPrompter(Some("yes, proceed"))));

        let result = AskUserTool.execute(json!({"question": "Continue?"}), &ctx).await;

        assert!(!result.is_error);
        assert_eq!(result.content, "yes, proceed");
    }

    #[tokio::test]
    async fn no_response_falls_back_to_marker() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "task".to_string())
            .with_user_prompter(Arc::new(StaticPrompter(None)));

        let result = AskUserTool.execute(json!({"question": "Continue?"}), &ctx).await;

        assert!(!result.is_error);
        assert!(result.content.contains("no response"));
    }

    #[tokio::test]
    async fn missing_prompter_is_an_error() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "task".to_string());

        let result = AskUserTool.execute(json!({"question": "Continue?"}), &ctx).await;

        assert!(result.is_error);
    }
}
