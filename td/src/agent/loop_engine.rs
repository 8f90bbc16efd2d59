//! The agent loop (§4.3): call provider, run tools, repeat until `EndTurn`,
//! a failure stop reason, `complete_task`, or the iteration bound.

use tracing::{debug, warn};

use crate::llm::{ContentBlock, Message, ProviderGateway, StopReason, ToolCall, ToolDefinition};
use crate::tools::{ToolContext, ToolExecutor};

use super::failure::scan_for_error_markers;

const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const KOBOLD_MAX_ITERATIONS: u32 = 30;

/// Terminal outcome of an agent loop run.
#[derive(Debug, Clone)]
pub enum AgentLoopResult {
    /// The provider ended its turn with no further tool calls.
    Complete { text: String },
    /// `complete_task` was called; the loop stopped without waiting for
    /// `EndTurn`.
    TaskCompleted { text: String },
    /// The iteration bound was reached. Distinct from `Complete` - never
    /// treated as success.
    MaxIterations,
    /// The provider gateway returned `Error` or `NotConfigured`, or the
    /// failure-detection heuristic fired on the final assistant text.
    Failed { message: String },
}

impl AgentLoopResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::MaxIterations)
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Complete { text } | Self::TaskCompleted { text } => text,
            Self::MaxIterations => "",
            Self::Failed { message } => message,
        }
    }
}

/// Drives one agent loop run against a fixed system prompt, starting user
/// message, and tool set.
pub struct AgentLoop<'a> {
    gateway: &'a ProviderGateway,
    tools: &'a ToolExecutor,
    max_iterations: u32,
}

impl<'a> AgentLoop<'a> {
    pub fn new(gateway: &'a ProviderGateway, tools: &'a ToolExecutor) -> Self {
        Self { gateway, tools, max_iterations: DEFAULT_MAX_ITERATIONS }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub async fn run(&self, system_prompt: &str, opening_message: &str, ctx: &ToolContext) -> AgentLoopResult {
        let tool_defs = self.tools.definitions();
        let mut messages = vec![Message::user(opening_message)];

        for iteration in 1..=self.max_iterations {
            debug!(iteration, max = self.max_iterations, "AgentLoop::run: iteration start");

            let response = self.gateway.send_message(system_prompt, messages.clone(), tool_defs.clone()).await;

            match response.stop_reason {
                StopReason::Error | StopReason::NotConfigured => {
                    let message = response.content.clone().unwrap_or_else(|| "agent loop failed with no message".to_string());
                    warn!(%message, "AgentLoop::run: provider returned a failure stop reason");
                    return AgentLoopResult::Failed { message };
                }
                StopReason::ToolUse => {
                    messages.push(assistant_message(&response));

                    if let Some(completed) = find_complete_task_call(&response.tool_calls) {
                        let results = self.tools.execute_all(&response.tool_calls, ctx).await;
                        let _ = results; // complete_task's own result is surfaced via `completed`
                        return AgentLoopResult::TaskCompleted { text: completed };
                    }

                    let results = self.tools.execute_all(&response.tool_calls, ctx).await;
                    messages.push(tool_result_message(&results));
                }
                StopReason::EndTurn => {
                    let text = response.content.clone().unwrap_or_default();
                    messages.push(assistant_message(&response));

                    if response.tool_calls.is_empty() && let Some(marker) = scan_for_error_markers(&text) {
                        warn!(%marker, "AgentLoop::run: failure heuristic matched final assistant text");
                        return AgentLoopResult::Failed { message: text };
                    }

                    return AgentLoopResult::Complete { text };
                }
            }
        }

        warn!(max_iterations = self.max_iterations, "AgentLoop::run: max iterations reached");
        AgentLoopResult::MaxIterations
    }
}

fn assistant_message(response: &crate::llm::CompletionResponse) -> Message {
    let mut blocks = Vec::new();
    if let Some(text) = &response.content {
        blocks.push(ContentBlock::Text { text: text.clone() });
    }
    for call in &response.tool_calls {
        blocks.push(ContentBlock::ToolUse { id: call.id.clone(), name: call.name.clone(), input: call.input.clone() });
    }
    Message::assistant_blocks(blocks)
}

fn tool_result_message(results: &[(String, crate::tools::ToolResult)]) -> Message {
    let blocks: Vec<ContentBlock> = results
        .iter()
        .map(|(id, result)| ContentBlock::ToolResult { tool_use_id: id.clone(), content: result.content.clone(), is_error: result.is_error })
        .collect();
    Message::tool_results(blocks)
}

fn find_complete_task_call(calls: &[ToolCall]) -> Option<String> {
    calls
        .iter()
        .find(|c| c.name == "complete_task")
        .map(|c| c.input.get("summary").and_then(|v| v.as_str()).unwrap_or("task completed").to_string())
}

pub fn standard_tool_definitions(tools: &ToolExecutor) -> Vec<ToolDefinition> {
    tools.definitions()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, TokenUsage};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn ctx() -> (tempfile::TempDir, ToolContext) {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "task".to_string());
        (temp, ctx)
    }

    fn end_turn(text: &str) -> CompletionResponse {
        CompletionResponse { content: Some(text.to_string()), tool_calls: vec![], stop_reason: StopReason::EndTurn, usage: TokenUsage::default() }
    }

    #[tokio::test]
    async fn end_turn_with_clean_text_is_complete() {
        let mock = MockLlmClient::new(vec![end_turn("all done, no issues")]);
        let gateway = ProviderGateway::new(Arc::new(mock), 4096);
        let tools = ToolExecutor::empty();
        let (_temp, ctx) = ctx();

        let result = AgentLoop::new(&gateway, &tools).run("system", "go", &ctx).await;

        assert!(matches!(result, AgentLoopResult::Complete { .. }));
        assert!(!result.is_failure());
    }

    #[tokio::test]
    async fn end_turn_with_error_marker_is_failed() {
        let mock = MockLlmClient::new(vec![end_turn("Error: could not compile the project")]);
        let gateway = ProviderGateway::new(Arc::new(mock), 4096);
        let tools = ToolExecutor::empty();
        let (_temp, ctx) = ctx();

        let result = AgentLoop::new(&gateway, &tools).run("system", "go", &ctx).await;

        assert!(result.is_failure());
    }

    #[tokio::test]
    async fn provider_error_is_failed_immediately() {
        let mock = MockLlmClient::new(vec![CompletionResponse::error("network exploded")]);
        let gateway = ProviderGateway::new(Arc::new(mock), 4096);
        let tools = ToolExecutor::empty();
        let (_temp, ctx) = ctx();

        let result = AgentLoop::new(&gateway, &tools).run("system", "go", &ctx).await;

        assert!(matches!(result, AgentLoopResult::Failed { .. }));
    }

    #[tokio::test]
    async fn exhausting_responses_without_end_turn_hits_max_iterations() {
        let mock = MockLlmClient::new(vec![]);
        let gateway = ProviderGateway::new(Arc::new(mock), 4096);
        let tools = ToolExecutor::empty();
        let (_temp, ctx) = ctx();

        let result = AgentLoop::new(&gateway, &tools).with_max_iterations(2).run("system", "go", &ctx).await;

        assert!(matches!(result, AgentLoopResult::MaxIterations));
        assert!(result.is_failure());
    }
}
