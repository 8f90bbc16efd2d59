//! The provider gateway (§4.1): the one thing agent loops call. Wraps a
//! concrete `LlmClient` plus its resolved configuration, and exposes the
//! single `send_message` operation the rest of the core depends on.

use std::sync::Arc;

use tracing::debug;

use super::config::{LlmConfig, ResolvedLlmConfig};
use super::http::HttpLlmClient;
use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Message, ToolDefinition};

pub struct ProviderGateway {
    client: Arc<dyn LlmClient>,
    max_tokens: u32,
}

impl ProviderGateway {
    pub fn new(client: Arc<dyn LlmClient>, max_tokens: u32) -> Self {
        Self { client, max_tokens }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let resolved = config.resolve().map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Self::from_resolved(&resolved)
    }

    pub fn from_resolved(config: &ResolvedLlmConfig) -> Result<Self, LlmError> {
        debug!(provider = %config.provider, model = %config.model, "ProviderGateway::from_resolved: called");
        let client = Arc::new(HttpLlmClient::from_config(config)?);
        Ok(Self::new(client, config.max_tokens))
    }

    /// `SendMessage(messages, tools, systemPrompt) -> Response` (§4.1). The
    /// configuration gate and retry policy live inside the concrete
    /// client; this layer only shapes the request and never lets a
    /// `LlmError` escape past it - any transport failure is converted to a
    /// `stopReason=Error` response, so callers reason about one failure
    /// channel.
    pub async fn send_message(&self, system_prompt: impl Into<String>, messages: Vec<Message>, tools: Vec<ToolDefinition>) -> CompletionResponse {
        let request = CompletionRequest { system_prompt: system_prompt.into(), messages, tools, max_tokens: self.max_tokens };
        match self.client.complete(request).await {
            Ok(response) => response,
            Err(err) => CompletionResponse::error(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{StopReason, TokenUsage};

    #[tokio::test]
    async fn send_message_returns_mock_response() {
        let mock = Arc::new(MockLlmClient::new(vec![CompletionResponse { content: Some("hi".into()), tool_calls: vec![], stop_reason: StopReason::EndTurn, usage: TokenUsage::default() }]));
        let gateway = ProviderGateway::new(mock, 1000);
        let response = gateway.send_message("sys", vec![Message::user("hello")], vec![]).await;
        assert_eq!(response.content, Some("hi".to_string()));
        assert_eq!(response.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn exhausted_mock_surfaces_as_error_stop_reason() {
        let mock = Arc::new(MockLlmClient::new(vec![]));
        let gateway = ProviderGateway::new(mock, 1000);
        let response = gateway.send_message("sys", vec![Message::user("hello")], vec![]).await;
        assert_eq!(response.stop_reason, StopReason::Error);
    }
}
