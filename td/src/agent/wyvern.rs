//! Wyvern (§4.7): the detailed analyzer. Reads the spec plus Wyrm's
//! recommendation and emits an area/task graph, materialized as one markdown
//! task file per area under `tasks/`.

use taskstore::now_ms;
use tracing::warn;

use crate::domain::{self, AnalysisError, AnalyzedTask, Area, Structure, Task, WyvernAnalysis, short_slug};
use crate::llm::ProviderGateway;
use crate::tools::{ToolContext, ToolExecutor};

use super::loop_engine::{AgentLoop, AgentLoopResult};

const SYSTEM_PROMPT: &str = "You are Wyvern, a detailed planning agent. Read the project \
specification and the pre-analyzer's recommendation, then respond with a single JSON object: \
{\"areas\": [{\"name\": string, \"tasks\": [{\"title\": string, \"description\": string, \
\"agent_type\": string, \"priority\": \"Low\"|\"Medium\"|\"High\"|\"Critical\", \"depends_on\": \
string[]}]}], \"estimated_complexity\": string}. Titles must be unique across the whole document - \
depends_on refers to other tasks by title. Emit only the JSON object, optionally inside a ```json \
fenced block.";

#[derive(Debug, thiserror::Error)]
pub enum WyvernError {
    #[error("wyvern agent loop did not complete: {0}")]
    LoopFailed(String),
    #[error("wyvern output did not parse as JSON: {0}")]
    InvalidJson(String),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

#[derive(serde::Deserialize)]
struct WyvernOutput {
    areas: Vec<Area>,
    #[serde(default)]
    estimated_complexity: String,
}

pub struct WyvernOutcome {
    pub analysis: WyvernAnalysis,
    /// One file's worth of task rows per area, in analysis order.
    pub task_files: Vec<(String, Vec<Task>)>,
}

pub async fn run_wyvern(
    project_id: &str,
    specification: &str,
    wyrm_recommendation_json: &str,
    spec_version_id: &str,
    gateway: &ProviderGateway,
    ctx: &ToolContext,
) -> Result<WyvernOutcome, WyvernError> {
    let tools = ToolExecutor::standard();
    let opening_message = format!(
        "## Project specification ({project_id})\n\n{specification}\n\n## Pre-analyzer recommendation\n\n{wyrm_recommendation_json}"
    );

    let result = AgentLoop::new(gateway, &tools).run(SYSTEM_PROMPT, &opening_message, ctx).await;

    let text = match &result {
        AgentLoopResult::Complete { text } | AgentLoopResult::TaskCompleted { text } => text.clone(),
        AgentLoopResult::MaxIterations => return Err(WyvernError::LoopFailed("reached iteration bound without producing an analysis".into())),
        AgentLoopResult::Failed { message } => return Err(WyvernError::LoopFailed(message.clone())),
    };

    let mut output = parse_output(&text)?;
    domain::ensure_readme_task(&mut output.areas);
    domain::compute_levels(&mut output.areas)?;

    let total_tasks: usize = output.areas.iter().map(|a| a.tasks.len()).sum();
    let analysis = WyvernAnalysis {
        project_id: project_id.to_string(),
        areas: output.areas.clone(),
        total_tasks,
        estimated_complexity: output.estimated_complexity,
        analyzed_at: now_ms(),
        spec_version_id: spec_version_id.to_string(),
        structure: Structure::default(),
    };

    let task_files = output
        .areas
        .iter()
        .enumerate()
        .map(|(index, area)| (area.name.clone(), materialize_area(area, index, spec_version_id)))
        .collect();

    Ok(WyvernOutcome { analysis, task_files })
}

fn materialize_area(area: &Area, area_index: usize, spec_version_id: &str) -> Vec<Task> {
    area.tasks
        .iter()
        .enumerate()
        .map(|(task_index, analyzed)| {
            let id = short_slug(&[&area.name, &area_index.to_string(), &task_index.to_string(), &analyzed.title]);
            let mut task = Task::new(id, analyzed.description.clone(), spec_version_id);
            task.priority = analyzed.priority;
            task.assigned_agent_type = analyzed.agent_type.clone();
            task.level = analyzed.level;
            task
        })
        .collect()
}

fn parse_output(text: &str) -> Result<WyvernOutput, WyvernError> {
    let candidate = extract_json_object(text).ok_or_else(|| WyvernError::InvalidJson("no JSON object found in response".to_string()))?;
    let output: WyvernOutput = serde_json::from_str(candidate).map_err(|e| WyvernError::InvalidJson(e.to_string()))?;
    if output.areas.is_empty() {
        warn!("wyvern: analysis produced zero areas before README injection");
    }
    Ok(output)
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Renders a project's full analysis as the human-readable `analysis.md`
/// companion to `analysis.json`.
pub fn render_analysis_markdown(analysis: &WyvernAnalysis) -> String {
    let mut out = format!("# Analysis\n\nComplexity: {}\n\nTotal tasks: {}\n\n", analysis.estimated_complexity, analysis.total_tasks);
    for area in &analysis.areas {
        out.push_str(&format!("## {}\n\n", area.name));
        for task in &area.tasks {
            out.push_str(&format!("- **{}** (level {}, {:?}) - {}\n", task.title, task.level, task.priority, task.description));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, StopReason, TokenUsage};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn end_turn(text: &str) -> CompletionResponse {
        CompletionResponse { content: Some(text.to_string()), tool_calls: vec![], stop_reason: StopReason::EndTurn, usage: TokenUsage::default() }
    }

    fn ctx() -> (tempfile::TempDir, ToolContext) {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "wyvern-task".to_string());
        (temp, ctx)
    }

    #[tokio::test]
    async fn well_formed_response_materializes_task_files_with_readme_injected() {
        let body = r#"{"areas":[{"name":"Backend","tasks":[
            {"title":"Add endpoint","description":"Add the endpoint","agent_type":"backend","priority":"High","depends_on":[]}
        ]}],"estimated_complexity":"medium"}"#;
        let mock = MockLlmClient::new(vec![end_turn(body)]);
        let gateway = ProviderGateway::new(Arc::new(mock), 4096);
        let (_temp, ctx) = ctx();

        let outcome = run_wyvern("proj-1", "build a todo app", "{}", "spec-1", &gateway, &ctx).await.unwrap();

        assert_eq!(outcome.analysis.areas.len(), 2); // Backend + injected Documentation
        let doc_area = outcome.task_files.iter().find(|(name, _)| name == "Documentation").unwrap();
        assert_eq!(doc_area.1.len(), 1);
        assert_eq!(doc_area.1[0].level, 0);
    }

    #[tokio::test]
    async fn dependency_cycle_aborts_with_no_materialized_tasks() {
        let body = r#"{"areas":[{"name":"Backend","tasks":[
            {"title":"a","description":"","agent_type":"backend","priority":"Medium","depends_on":["b"]},
            {"title":"b","description":"","agent_type":"backend","priority":"Medium","depends_on":["a"]}
        ]}],"estimated_complexity":"low"}"#;
        let mock = MockLlmClient::new(vec![end_turn(body)]);
        let gateway = ProviderGateway::new(Arc::new(mock), 4096);
        let (_temp, ctx) = ctx();

        let result = run_wyvern("proj-1", "spec", "{}", "spec-1", &gateway, &ctx).await;
        assert!(matches!(result, Err(WyvernError::Analysis(AnalysisError::Cycle(_)))));
    }

    #[tokio::test]
    async fn unparseable_output_is_rejected() {
        let mock = MockLlmClient::new(vec![end_turn("no json here")]);
        let gateway = ProviderGateway::new(Arc::new(mock), 4096);
        let (_temp, ctx) = ctx();

        let result = run_wyvern("proj-1", "spec", "{}", "spec-1", &gateway, &ctx).await;
        assert!(matches!(result, Err(WyvernError::InvalidJson(_))));
    }
}
