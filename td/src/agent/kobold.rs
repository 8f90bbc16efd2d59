//! Kobold worker (§4.4): owns its own state machine, runs one task through
//! the agent loop, and drives its `Plan` via `update_plan_step`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::{Kobold, KoboldStateError, Plan};
use crate::llm::ProviderGateway;
use crate::prompts::PromptLoader;
use crate::tools::{ToolContext, ToolExecutor, UserPrompter};

use super::loop_engine::{AgentLoop, AgentLoopResult, KOBOLD_MAX_ITERATIONS};

/// Persists and (re)loads a Kobold's implementation plan. Implemented by
/// the plan store; kept as a trait here so the worker doesn't depend on
/// the storage layer directly.
#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Loads the persisted plan for (project, task), or creates a fresh one.
    /// If the persisted plan's `spec_version_id` differs from
    /// `spec_version_id`, it is discarded and a new plan is created instead.
    async fn load_or_create(&self, project_id: &str, task_id: &str, agent_type: &str, spec_version_id: &str) -> Arc<Mutex<Plan>>;

    /// Persists the plan's current state (debounced at the store's
    /// discretion).
    async fn save(&self, plan: &Plan);
}

/// Everything the opening agent message needs beyond the task description
/// itself (§4.4 step 3).
pub struct KoboldContext {
    pub specification: String,
    pub structure_hints: String,
    pub similar_task_insights: Vec<String>,
    pub files_in_use_elsewhere: Vec<String>,
}

pub struct KoboldOutcome {
    pub plan_completed: bool,
}

/// Drives one `StartWork` call end to end. Takes `kobold` by `&mut` since
/// only this function (standing in for the Kobold's own method) is allowed
/// to transition its status.
pub async fn start_work(
    kobold: &mut Kobold,
    task_description: &str,
    gateway: &ProviderGateway,
    plans: &dyn PlanRepository,
    project_id: &str,
    spec_version_id: &str,
    workspace: PathBuf,
    ctx_info: KoboldContext,
    user_prompter: Option<Arc<dyn UserPrompter>>,
) -> Result<KoboldOutcome, KoboldStateError> {
    let task_id = kobold.task_id.clone().expect("assigned kobold always has a task_id");

    kobold.mark_started()?;
    info!(kobold_id = %kobold.id, %task_id, "kobold: started work");

    let plan = plans.load_or_create(project_id, &task_id, &kobold.agent_type, spec_version_id).await;

    let workspace_for_prompt = workspace.clone();
    let mut tool_ctx = ToolContext::new(workspace, task_id.clone());
    if let Some(prompter) = user_prompter {
        tool_ctx = tool_ctx.with_user_prompter(prompter);
    }

    let tools = ToolExecutor::for_kobold(plan.clone());
    let system_prompt = kobold_system_prompt(&workspace_for_prompt, &kobold.agent_type);
    let opening_message = build_opening_message(task_description, &ctx_info, &plan).await;

    let result = AgentLoop::new(gateway, &tools).with_max_iterations(KOBOLD_MAX_ITERATIONS).run(&system_prompt, &opening_message, &tool_ctx).await;

    let error_message = match &result {
        AgentLoopResult::Complete { .. } | AgentLoopResult::TaskCompleted { .. } => None,
        AgentLoopResult::MaxIterations => Some("kobold reached its iteration bound without completing the task".to_string()),
        AgentLoopResult::Failed { message } => Some(message.clone()),
    };

    if let Some(msg) = &error_message {
        warn!(kobold_id = %kobold.id, %task_id, error = %msg, "kobold: task failed");
    }

    kobold.mark_done(error_message);

    let plan_completed = {
        let mut locked = plan.lock().await;
        let completed = locked.steps.iter().all(|s| s.status.is_terminal()) && !locked.steps.is_empty();
        locked.status = if completed { crate::domain::PlanStatus::Completed } else { crate::domain::PlanStatus::InProgress };
        completed
    };
    plans.save(&*plan.lock().await).await;

    Ok(KoboldOutcome { plan_completed })
}

/// Renders Kobold's system prompt through the project's override chain,
/// falling back to the literal below on any loader error.
fn kobold_system_prompt(workspace: &std::path::Path, agent_type: &str) -> String {
    PromptLoader::new(workspace).render("kobold", &serde_json::json!({"agent_type": agent_type})).unwrap_or_else(|e| {
        warn!(error = %e, "kobold: falling back to the built-in system prompt");
        format!(
            "You are a {agent_type} implementation agent working through a fixed plan. \
             Call update_plan_step at each step boundary to record progress, and call \
             complete_task once the task's work is done and verified locally."
        )
    })
}

async fn build_opening_message(task_description: &str, ctx_info: &KoboldContext, plan: &Arc<Mutex<Plan>>) -> String {
    let locked = plan.lock().await;
    let remaining: Vec<String> = locked
        .steps
        .iter()
        .filter(|s| !s.status.is_terminal())
        .map(|s| format!("- [{}] {}: {}", s.index, s.title, s.description))
        .collect();

    let mut sections = vec![format!("## Task\n{task_description}"), format!("## Specification\n{}", ctx_info.specification)];

    if !ctx_info.structure_hints.is_empty() {
        sections.push(format!("## Project structure\n{}", ctx_info.structure_hints));
    }
    if !remaining.is_empty() {
        sections.push(format!("## Remaining plan steps\n{}", remaining.join("\n")));
    }
    if !ctx_info.similar_task_insights.is_empty() {
        sections.push(format!("## Insights from similar tasks\n{}", ctx_info.similar_task_insights.join("\n")));
    }
    if !ctx_info.files_in_use_elsewhere.is_empty() {
        sections.push(format!(
            "## Files currently being edited by other agents (advisory)\n{}",
            ctx_info.files_in_use_elsewhere.join("\n")
        ));
    }

    sections.join("\n\n")
}
