//! `ToolExecutor` - dispatches a model's tool calls to the standard tool set.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::Plan;
use crate::llm::{ToolCall, ToolDefinition};

use super::builtin::{
    AskUserTool, CompleteTaskTool, EditFileTool, GlobTool, GrepTool, ListDirectoryTool, ReadFileTool, RunCommandTool,
    UpdatePlanStepTool, WriteFileTool,
};
use super::{Tool, ToolContext, ToolResult};

/// Dispatches tool calls by name. Every role's agent loop gets the same
/// standard tool set; `update_plan_step` is only registered for a Kobold's
/// executor since it needs a handle to the plan it's driving.
pub struct ToolExecutor {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolExecutor {
    /// The standard tool set minus `update_plan_step`, which requires a
    /// `Plan` handle - see [`ToolExecutor::for_kobold`].
    pub fn standard() -> Self {
        let mut tools: HashMap<String, Box<dyn Tool>> = HashMap::new();
        tools.insert("read_file".into(), Box::new(ReadFileTool));
        tools.insert("write_file".into(), Box::new(WriteFileTool));
        tools.insert("edit_file".into(), Box::new(EditFileTool));
        tools.insert("list_directory".into(), Box::new(ListDirectoryTool));
        tools.insert("glob".into(), Box::new(GlobTool));
        tools.insert("grep".into(), Box::new(GrepTool));
        tools.insert("run_command".into(), Box::new(RunCommandTool));
        tools.insert("ask_user".into(), Box::new(AskUserTool));
        tools.insert("complete_task".into(), Box::new(CompleteTaskTool));
        Self { tools }
    }

    /// The standard tool set plus `update_plan_step` bound to `plan`.
    pub fn for_kobold(plan: Arc<Mutex<Plan>>) -> Self {
        let mut executor = Self::standard();
        executor.add_tool(Box::new(UpdatePlanStepTool::new(plan)));
        executor
    }

    /// An empty executor, for tests.
    pub fn empty() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        debug!(tool_name = %tool.name(), "ToolExecutor::add_tool: called");
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition { name: t.name().to_string(), description: t.description().to_string(), input_schema: t.input_schema() })
            .collect()
    }

    pub fn definitions_for(&self, tool_names: &[String]) -> Vec<ToolDefinition> {
        tool_names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDefinition { name: t.name().to_string(), description: t.description().to_string(), input_schema: t.input_schema() })
            .collect()
    }

    pub async fn execute(&self, tool_call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        debug!(tool_name = %tool_call.name, tool_id = %tool_call.id, "ToolExecutor::execute: called");
        match self.tools.get(&tool_call.name) {
            Some(tool) => tool.execute(tool_call.input.clone(), ctx).await,
            None => ToolResult::error(format!("Unknown tool: {}", tool_call.name)),
        }
    }

    pub async fn execute_all(&self, tool_calls: &[ToolCall], ctx: &ToolContext) -> Vec<(String, ToolResult)> {
        let mut results = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            let result = self.execute(call, ctx).await;
            results.push((call.id.clone(), result));
        }
        results
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn standard_executor_has_the_spec_tool_set() {
        let executor = ToolExecutor::standard();
        for name in ["read_file", "write_file", "edit_file", "list_directory", "glob", "grep", "run_command", "ask_user", "complete_task"] {
            assert!(executor.has_tool(name), "missing tool: {name}");
        }
        assert!(!executor.has_tool("update_plan_step"));
    }

    #[test]
    fn for_kobold_adds_update_plan_step() {
        let plan = Arc::new(Mutex::new(Plan::new("proj", "task", "kobold", "spec-1")));
        let executor = ToolExecutor::for_kobold(plan);
        assert!(executor.has_tool("update_plan_step"));
    }

    #[test]
    fn definitions_returns_all_registered_tools() {
        let executor = ToolExecutor::standard();
        let defs = executor.definitions();
        assert!(defs.iter().any(|d| d.name == "read_file"));
    }

    #[test]
    fn definitions_for_subset() {
        let executor = ToolExecutor::standard();
        let defs = executor.definitions_for(&["read_file".to_string(), "write_file".to_string()]);
        assert_eq!(defs.len(), 2);
    }

    #[tokio::test]
    async fn execute_unknown_tool_is_an_error() {
        let executor = ToolExecutor::standard();
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "task".to_string());

        let call = ToolCall { id: "call_1".to_string(), name: "unknown_tool".to_string(), input: serde_json::json!({}) };

        let result = executor.execute(&call, &ctx).await;
        assert!(result.is_error);
        assert!(result.content.contains("Unknown tool"));
    }
}
