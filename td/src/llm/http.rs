//! The one concrete HTTP-backed `LlmClient` (§4.1): speaks the OpenAI Chat
//! Completions wire format, which is also what local OpenAI-compatible
//! servers and several hosted providers accept, so a single implementation
//! covers that whole family. Anthropic-style or other wire formats are a
//! family this trait anticipates, not code carried here.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::config::ResolvedLlmConfig;
use super::{CompletionRequest, CompletionResponse, ContentBlock, LlmClient, LlmError, Message, MessageContent, Role, StopReason, StreamChunk, TokenUsage, ToolCall};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;
const BACKOFF_FACTOR: u64 = 2;
const BACKOFF_CAP_MS: u64 = 30_000;

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

fn backoff_for_attempt(attempt: u32) -> Duration {
    let ms = INITIAL_BACKOFF_MS.saturating_mul(BACKOFF_FACTOR.saturating_pow(attempt.saturating_sub(1)));
    Duration::from_millis(ms.min(BACKOFF_CAP_MS))
}

pub struct HttpLlmClient {
    model: String,
    api_key: Option<String>,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &ResolvedLlmConfig) -> Result<Self, LlmError> {
        debug!(provider = %config.provider, model = %config.model, "HttpLlmClient::from_config: called");
        let timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;
        Ok(Self { model: config.model.clone(), api_key: config.api_key.clone(), base_url: config.base_url.clone(), http, max_tokens: config.max_tokens })
    }

    /// §4.1's configuration gate, checked by every call before touching the
    /// network.
    fn configured_key(&self) -> Option<&str> {
        match &self.api_key {
            Some(k) if !k.is_empty() && !k.starts_with("${") => Some(k.as_str()),
            _ => None,
        }
    }

    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut messages = vec![serde_json::json!({"role": "system", "content": request.system_prompt})];
        messages.extend(self.convert_messages(&request.messages));

        let max_tokens = request.max_tokens.min(self.max_tokens);
        let uses_completion_tokens = self.model.starts_with("gpt-5") || self.model.starts_with("o1") || self.model.starts_with("o3");

        let mut body = serde_json::json!({"model": self.model, "messages": messages});
        if uses_completion_tokens {
            body["max_completion_tokens"] = serde_json::json!(max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(request.tools.iter().map(|t| t.to_openai_schema()).collect::<Vec<_>>());
            body["tool_choice"] = serde_json::json!("auto");
        }
        body
    }

    /// OpenAI requires one message per tool result, so a single internal
    /// message carrying several results (§4.3) fans out here.
    fn convert_messages(&self, messages: &[Message]) -> Vec<serde_json::Value> {
        let mut result = Vec::new();
        for msg in messages {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };

            match &msg.content {
                MessageContent::Text(text) => {
                    result.push(serde_json::json!({"role": role, "content": text}));
                }
                MessageContent::Blocks(blocks) => {
                    let mut tool_calls = Vec::new();
                    let mut tool_results = Vec::new();
                    let mut text_content = String::new();

                    for block in blocks {
                        match block {
                            ContentBlock::Text { text } => text_content.push_str(text),
                            ContentBlock::ToolUse { id, name, input } => {
                                tool_calls.push(serde_json::json!({
                                    "id": id,
                                    "type": "function",
                                    "function": {"name": name, "arguments": input.to_string()},
                                }));
                            }
                            ContentBlock::ToolResult { tool_use_id, content, .. } => {
                                tool_results.push((tool_use_id.clone(), content.clone()));
                            }
                        }
                    }

                    if !tool_results.is_empty() {
                        for (tool_call_id, content) in tool_results {
                            result.push(serde_json::json!({"role": "tool", "tool_call_id": tool_call_id, "content": content}));
                        }
                        continue;
                    }

                    if !tool_calls.is_empty() {
                        let mut m = serde_json::json!({"role": "assistant", "tool_calls": tool_calls});
                        if !text_content.is_empty() {
                            m["content"] = serde_json::json!(text_content);
                        }
                        result.push(m);
                        continue;
                    }

                    result.push(serde_json::json!({"role": role, "content": text_content}));
                }
            }
        }
        result
    }

    fn parse_response(&self, api_response: ApiResponse) -> CompletionResponse {
        let choice = api_response.choices.into_iter().next();
        let (content, tool_calls, stop_reason) = match choice {
            Some(c) => {
                let content = c.message.content;
                let tool_calls = c
                    .message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tc| ToolCall { id: tc.id, name: tc.function.name, input: serde_json::from_str(&tc.function.arguments).unwrap_or(serde_json::json!({})) })
                    .collect::<Vec<_>>();
                let stop_reason = match c.finish_reason.as_deref() {
                    Some("tool_calls") => StopReason::ToolUse,
                    _ => StopReason::EndTurn,
                };
                (content, tool_calls, stop_reason)
            }
            None => (None, vec![], StopReason::EndTurn),
        };

        CompletionResponse {
            content,
            tool_calls,
            stop_reason,
            usage: TokenUsage { input_tokens: api_response.usage.prompt_tokens, output_tokens: api_response.usage.completion_tokens, cache_read_tokens: 0, cache_creation_tokens: 0 },
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let Some(api_key) = self.configured_key() else {
            return Ok(CompletionResponse::not_configured("no API key configured for this provider"));
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(&request);

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = backoff_for_attempt(attempt);
                warn!(attempt, backoff_ms = backoff.as_millis() as u64, "complete: retrying after transient error");
                tokio::time::sleep(backoff).await;
            }

            let response = match self.http.post(&url).header("Authorization", format!("Bearer {api_key}")).header("content-type", "application/json").json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                let retry_after = response.headers().get("retry-after").and_then(|v| v.to_str().ok()).and_then(|s| s.parse::<u64>().ok()).unwrap_or(60);
                return Ok(CompletionResponse::error(format!("rate limited, retry after {retry_after}s")));
            }

            if is_retryable_status(status) && attempt < MAX_RETRIES {
                let text = response.text().await.unwrap_or_default();
                last_error = Some(LlmError::ApiError { status, message: text });
                continue;
            }

            if !response.status().is_success() {
                let text = response.text().await.unwrap_or_default();
                return Ok(CompletionResponse::error(format!("HTTP {status}: {text}")));
            }

            let api_response: ApiResponse = response.json().await.map_err(LlmError::Network)?;
            return Ok(self.parse_response(api_response));
        }

        Ok(CompletionResponse::error(last_error.map(|e| e.to_string()).unwrap_or_else(|| "max retries exceeded".to_string())))
    }

    async fn stream(&self, request: CompletionRequest, chunk_tx: mpsc::Sender<StreamChunk>) -> Result<CompletionResponse, LlmError> {
        let Some(api_key) = self.configured_key() else {
            let resp = CompletionResponse::not_configured("no API key configured for this provider");
            let _ = chunk_tx.send(StreamChunk::MessageDone { stop_reason: resp.stop_reason, usage: resp.usage }).await;
            return Ok(resp);
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut body = self.build_request_body(&request);
        body["stream"] = serde_json::json!(true);

        let response = self.http.post(&url).header("Authorization", format!("Bearer {api_key}")).header("content-type", "application/json").json(&body).send().await.map_err(LlmError::Network)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Ok(CompletionResponse::error(format!("HTTP {status}: {text}")));
        }

        let mut stream = response.bytes_stream();
        let mut full_content = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut current_tool_calls: std::collections::HashMap<usize, (String, String, String)> = std::collections::HashMap::new();
        let mut stop_reason = StopReason::EndTurn;
        let mut usage = TokenUsage::default();
        let mut buffer = String::new();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(LlmError::Network)?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer = buffer[line_end + 1..].to_string();

                if line.is_empty() || line == "data: [DONE]" {
                    continue;
                }

                if let Some(data) = line.strip_prefix("data: ")
                    && let Ok(chunk_data) = serde_json::from_str::<StreamApiChunk>(data)
                {
                    if let Some(choice) = chunk_data.choices.first() {
                        if let Some(content) = &choice.delta.content {
                            full_content.push_str(content);
                            let _ = chunk_tx.send(StreamChunk::TextDelta(content.clone())).await;
                        }

                        if let Some(tcs) = &choice.delta.tool_calls {
                            for tc in tcs {
                                let entry = current_tool_calls.entry(tc.index).or_insert_with(|| (String::new(), String::new(), String::new()));
                                if let Some(id) = &tc.id {
                                    entry.0 = id.clone();
                                }
                                if let Some(func) = &tc.function {
                                    if let Some(name) = &func.name {
                                        entry.1 = name.clone();
                                        let _ = chunk_tx.send(StreamChunk::ToolUseStart { id: entry.0.clone(), name: name.clone() }).await;
                                    }
                                    if let Some(args) = &func.arguments {
                                        entry.2.push_str(args);
                                        let _ = chunk_tx.send(StreamChunk::ToolUseDelta { id: entry.0.clone(), json_delta: args.clone() }).await;
                                    }
                                }
                            }
                        }

                        if let Some(reason) = &choice.finish_reason {
                            stop_reason = match reason.as_str() {
                                "tool_calls" => StopReason::ToolUse,
                                _ => StopReason::EndTurn,
                            };
                        }
                    }

                    if let Some(u) = chunk_data.usage {
                        usage.input_tokens = u.prompt_tokens;
                        usage.output_tokens = u.completion_tokens;
                    }
                }
            }
        }

        for (_, (id, name, args)) in current_tool_calls {
            let input = serde_json::from_str(&args).unwrap_or(serde_json::json!({}));
            tool_calls.push(ToolCall { id: id.clone(), name, input });
            let _ = chunk_tx.send(StreamChunk::ToolUseEnd { id }).await;
        }

        let _ = chunk_tx.send(StreamChunk::MessageDone { stop_reason, usage: usage.clone() }).await;

        Ok(CompletionResponse { content: if full_content.is_empty() { None } else { Some(full_content) }, tool_calls, stop_reason, usage })
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct StreamApiChunk {
    choices: Vec<StreamApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamApiChoice {
    delta: StreamApiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamApiDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamApiToolCall {
    index: usize,
    id: Option<String>,
    function: Option<StreamApiFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamApiFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpLlmClient {
        HttpLlmClient { model: "gpt-4o".to_string(), api_key: Some("test-key".to_string()), base_url: "https://api.openai.com".to_string(), http: Client::new(), max_tokens: 8192 }
    }

    #[test]
    fn build_request_body_basic() {
        let client = client();
        let request = CompletionRequest { system_prompt: "You are helpful".to_string(), messages: vec![Message::user("Hello")], tools: vec![], max_tokens: 1000 };
        let body = client.build_request_body(&request);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn max_tokens_capped_to_client_limit() {
        let mut client = client();
        client.max_tokens = 1000;
        let request = CompletionRequest { system_prompt: "Test".to_string(), messages: vec![], tools: vec![], max_tokens: 5000 };
        let body = client.build_request_body(&request);
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn unconfigured_client_never_reaches_network() {
        let mut client = client();
        client.api_key = Some("${OPENAI_API_KEY}".to_string());
        assert!(client.configured_key().is_none());
    }

    #[test]
    fn backoff_respects_cap() {
        assert_eq!(backoff_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(backoff_for_attempt(2), Duration::from_millis(2000));
        assert!(backoff_for_attempt(10) <= Duration::from_millis(BACKOFF_CAP_MS));
    }
}
