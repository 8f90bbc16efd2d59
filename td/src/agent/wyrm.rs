//! Wyrm (§4.7): the pre-analyzer. Reads a specification and emits a
//! [`WyrmRecommendation`], hallucination-tolerant by design - the only
//! validation applied is that the JSON parses and carries its two required
//! fields.

use tracing::warn;

use crate::domain::WyrmRecommendation;
use crate::llm::ProviderGateway;
use crate::tools::{ToolContext, ToolExecutor};

use super::loop_engine::{AgentLoop, AgentLoopResult};

const SYSTEM_PROMPT: &str = "You are Wyrm, a pre-analysis agent. Read the project specification \
and respond with a single JSON object describing it: {\"project_id\": string, \"detected_languages\": \
string[], \"tech_stack\": {key: value}, \"suggested_agent_types\": string[], \"verification_steps\": \
[{\"check_type\": \"build\"|\"test\"|\"lint\"|\"doc\", \"command\": string, \"priority\": \
\"Low\"|\"Medium\"|\"High\"|\"Critical\", \"success_criterion\": string}]}. Emit only the JSON \
object, optionally inside a ```json fenced block.";

#[derive(Debug, thiserror::Error)]
pub enum WyrmError {
    #[error("wyrm agent loop did not complete: {0}")]
    LoopFailed(String),
    #[error("wyrm output did not parse as JSON: {0}")]
    InvalidJson(String),
    #[error("wyrm recommendation rejected: {0}")]
    Invalid(String),
}

pub async fn run_wyrm(project_id: &str, specification: &str, gateway: &ProviderGateway, ctx: &ToolContext) -> Result<WyrmRecommendation, WyrmError> {
    let tools = ToolExecutor::standard();
    let opening_message = format!("## Project specification ({project_id})\n\n{specification}");

    let result = AgentLoop::new(gateway, &tools).run(SYSTEM_PROMPT, &opening_message, ctx).await;

    let text = match &result {
        AgentLoopResult::Complete { text } | AgentLoopResult::TaskCompleted { text } => text.clone(),
        AgentLoopResult::MaxIterations => return Err(WyrmError::LoopFailed("reached iteration bound without producing a recommendation".into())),
        AgentLoopResult::Failed { message } => return Err(WyrmError::LoopFailed(message.clone())),
    };

    let mut recommendation = parse_recommendation(&text)?;
    recommendation.project_id = project_id.to_string();

    recommendation.validate().map_err(WyrmError::Invalid)?;
    if recommendation.detected_languages.is_empty() && recommendation.suggested_agent_types.is_empty() {
        warn!(project_id, "wyrm: recommendation has no detected languages or suggested agent types");
    }

    Ok(recommendation)
}

fn parse_recommendation(text: &str) -> Result<WyrmRecommendation, WyrmError> {
    let candidate = extract_json_object(text).ok_or_else(|| WyrmError::InvalidJson("no JSON object found in response".to_string()))?;
    serde_json::from_str(candidate).map_err(|e| WyrmError::InvalidJson(e.to_string()))
}

/// Pulls the first top-level `{...}` object out of `text`, whether it's bare
/// or wrapped in a markdown code fence.
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
        let ctx = ToolContext::new(temp.path().to_path_buf(), "wyrm-task".to_string());
        (temp, ctx)
    }

    #[test]
    fn extracts_fenced_json() {
        let text = "Here is my analysis:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json_object(text), Some("{\"a\": 1}"));
    }

    #[tokio::test]
    async fn well_formed_response_produces_a_recommendation() {
        let body = r#"{"project_id":"ignored","detected_languages":["rust"],"tech_stack":{},"suggested_agent_types":["backend"],"verification_steps":[]}"#;
        let mock = MockLlmClient::new(vec![end_turn(body)]);
        let gateway = ProviderGateway::new(Arc::new(mock), 4096);
        let (_temp, ctx) = ctx();

        let rec = run_wyrm("proj-1", "build a todo app", &gateway, &ctx).await.unwrap();

        assert_eq!(rec.project_id, "proj-1");
        assert_eq!(rec.detected_languages, vec!["rust".to_string()]);
    }

    #[tokio::test]
    async fn unparseable_output_is_rejected() {
        let mock = MockLlmClient::new(vec![end_turn("I couldn't figure out the stack.")]);
        let gateway = ProviderGateway::new(Arc::new(mock), 4096);
        let (_temp, ctx) = ctx();

        let result = run_wyrm("proj-1", "build a todo app", &gateway, &ctx).await;
        assert!(matches!(result, Err(WyrmError::InvalidJson(_))));
    }

    #[tokio::test]
    async fn empty_lists_still_validate_per_the_hallucination_tolerant_contract() {
        let body = r#"{"project_id":"x","detected_languages":[],"tech_stack":{},"suggested_agent_types":[],"verification_steps":[]}"#;
        let mock = MockLlmClient::new(vec![end_turn(body)]);
        let gateway = ProviderGateway::new(Arc::new(mock), 4096);
        let (_temp, ctx) = ctx();

        let result = run_wyrm("proj-1", "build a todo app", &gateway, &ctx).await;
        assert!(result.is_ok());
    }
}
