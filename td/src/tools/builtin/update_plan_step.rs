//! update_plan_step tool - Kobold-only, mutates the active plan (§4.2, §4.9)

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::domain::{Plan, StepStatus};
use crate::tools::{Tool, ToolContext, ToolResult};

/// Mutates the `Plan` a Kobold is executing against. Holds its own handle to
/// the plan rather than going through `ToolContext` - only the Kobold loop
/// wires this tool in, and it shares the same lock the plan store persists
/// through after each step.
pub struct UpdatePlanStepTool {
    plan: Arc<Mutex<Plan>>,
}

impl UpdatePlanStepTool {
    pub fn new(plan: Arc<Mutex<Plan>>) -> Self {
        Self { plan }
    }
}

#[async_trait]
impl Tool for UpdatePlanStepTool {
    fn name(&self) -> &'static str {
        "update_plan_step"
    }

    fn description(&self) -> &'static str {
        "Update the status of a step in the current plan, optionally recording its output."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "index": {
                    "type": "integer",
                    "description": "Index of the step to update"
                },
                "status": {
                    "type": "string",
                    "enum": ["pending", "in_progress", "completed", "skipped", "failed"],
                    "description": "New status for the step"
                },
                "output": {
                    "type": "string",
                    "description": "Output or notes to record against the step"
                }
            },
            "required": ["index", "status"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let Some(index) = input.get("index").and_then(|v| v.as_u64()).map(|v| v as usize) else {
            return ToolResult::error("index is required");
        };

        let status = match input.get("status").and_then(|v| v.as_str()) {
            Some("pending") => StepStatus::Pending,
            Some("in_progress") => StepStatus::InProgress,
            Some("completed") => StepStatus::Completed,
            Some("skipped") => StepStatus::Skipped,
            Some("failed") => StepStatus::Failed,
            Some(other) => return ToolResult::error(format!("invalid status: {other}")),
            None => return ToolResult::error("status is required"),
        };

        let output = input.get("output").and_then(|v| v.as_str()).map(String::from);

        let mut plan = self.plan.lock().await;
        if plan.steps.get(index).is_none() {
            return ToolResult::error(format!("no step at index {index}"));
        }
        plan.update_step(index, status, output);

        ToolResult::success(format!("Step {index} set to {status:?}"))
    }
}
