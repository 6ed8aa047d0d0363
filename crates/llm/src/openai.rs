use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use quill_common::{QuillError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{
    ChatMessage, ChunkStream, LlmClient, LlmRequest, Role, StreamChunk, ToolCallRequest,
    ToolChoice,
};
use crate::sse::parse_sse_lines;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Serialize, Debug, Clone)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OpenAiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: OpenAiFunctionCall,
}

#[derive(Serialize, Debug, Clone)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize, Debug, Clone)]
struct OpenAiTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: OpenAiFunction,
}

#[derive(Serialize, Debug, Clone)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCallDelta>,
}

#[derive(Deserialize)]
struct OpenAiToolCallDelta {
    index: u32,
    id: Option<String>,
    function: Option<OpenAiFunctionDelta>,
}

#[derive(Deserialize)]
struct OpenAiFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Assembles tool calls that arrive split across many stream chunks.
#[derive(Default)]
struct ToolCallAccumulator {
    calls: BTreeMap<u32, ToolCallRequest>,
}

impl ToolCallAccumulator {
    fn apply(&mut self, delta: OpenAiToolCallDelta) {
        let entry = self
            .calls
            .entry(delta.index)
            .or_insert_with(|| ToolCallRequest {
                id: String::new(),
                name: String::new(),
                arguments: String::new(),
            });
        if let Some(id) = delta.id {
            entry.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                entry.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    fn drain(&mut self) -> Vec<ToolCallRequest> {
        std::mem::take(&mut self.calls).into_values().collect()
    }
}

/// Streaming client for OpenAI-compatible `/v1/chat/completions` endpoints.
pub struct OpenAiClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(base_url: Option<String>, model: String, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            api_key,
            default_temperature: None,
            default_max_tokens: None,
            http_client: reqwest::Client::new(),
        }
    }

    /// Sampling defaults used when a request leaves them unset.
    pub fn with_defaults(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.default_temperature = temperature;
        self.default_max_tokens = max_tokens;
        self
    }

    fn role_to_string(role: &Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    fn convert_message(msg: &ChatMessage) -> OpenAiMessage {
        OpenAiMessage {
            role: Self::role_to_string(&msg.role),
            content: msg.content.clone(),
            name: msg.name.as_deref().map(sanitize_name),
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|call| OpenAiToolCall {
                    id: call.id.clone(),
                    call_type: "function",
                    function: OpenAiFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }

    fn build_messages(request: &LlmRequest) -> Vec<OpenAiMessage> {
        let mut messages = Vec::new();
        if let Some(ref system) = request.system_prompt {
            messages.push(Self::convert_message(&ChatMessage {
                role: Role::System,
                ..ChatMessage::user(system.clone())
            }));
        }
        messages.extend(request.messages.iter().map(Self::convert_message));
        messages
    }

    fn build_request_body(&self, request: &LlmRequest) -> OpenAiRequest {
        OpenAiRequest {
            model: self.model.clone(),
            messages: Self::build_messages(request),
            temperature: request.temperature.or(self.default_temperature),
            max_tokens: request.max_tokens.or(self.default_max_tokens),
            stream: true,
            tools: request
                .tools
                .iter()
                .map(|spec| OpenAiTool {
                    tool_type: "function",
                    function: OpenAiFunction {
                        name: spec.name.clone(),
                        description: spec.description.clone(),
                        parameters: spec.parameters.clone(),
                    },
                })
                .collect(),
            tool_choice: match (request.tools.is_empty(), request.tool_choice) {
                (true, _) => None,
                (false, Some(ToolChoice::Required)) => Some("required"),
                (false, _) => Some("auto"),
            },
        }
    }
}

/// OpenAI restricts `name` to `^[a-zA-Z0-9_-]{1,64}$`.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(64)
        .collect()
}

/// Translate raw SSE payloads into stream chunks.
fn decode_chunks<S>(lines: S) -> ChunkStream
where
    S: futures::Stream<Item = Result<String>> + Send + 'static,
{
    type Item = Result<StreamChunk>;

    Box::pin(async_stream::stream! {
        let mut lines = std::pin::pin!(lines);
        let mut pending = ToolCallAccumulator::default();

        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    let v: Item = Err(e);
                    yield v;
                    return;
                }
            };

            let chunk: OpenAiStreamChunk = match serde_json::from_str(&line) {
                Ok(chunk) => chunk,
                Err(e) => {
                    let v: Item = Err(QuillError::UpstreamModel(format!(
                        "Failed to parse OpenAI stream chunk: {e}"
                    )));
                    yield v;
                    return;
                }
            };

            for choice in chunk.choices {
                if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                    let v: Item = Ok(StreamChunk::Text(text));
                    yield v;
                }
                for delta in choice.delta.tool_calls {
                    pending.apply(delta);
                }
                if let Some(reason) = choice.finish_reason {
                    for call in pending.drain() {
                        let v: Item = Ok(StreamChunk::ToolCall(call));
                        yield v;
                    }
                    let v: Item = Ok(StreamChunk::Done { finish_reason: Some(reason) });
                    yield v;
                }
            }
        }
    })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn stream(&self, request: LlmRequest) -> Result<ChunkStream> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(&request);

        debug!(
            model = %self.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Opening OpenAI stream"
        );

        let mut http_req = self.http_client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            http_req = http_req.bearer_auth(key);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| QuillError::UpstreamModel(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(|v| format!(", Retry-After: {v}"))
                .unwrap_or_default();
            let body_text = response.text().await.unwrap_or_default();
            return Err(QuillError::UpstreamModel(format!(
                "OpenAI API error {status}: {body_text}{retry_after}"
            )));
        }

        Ok(decode_chunks(parse_sse_lines(Box::pin(response.bytes_stream()))))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ToolSpec;

    fn lines(payloads: &[&str]) -> impl futures::Stream<Item = Result<String>> + Send + 'static {
        let owned: Vec<Result<String>> = payloads.iter().map(|p| Ok(p.to_string())).collect();
        futures::stream::iter(owned)
    }

    #[test]
    fn request_body_matches_openai_format() {
        let client = OpenAiClient::new(None, "gpt-4o".to_string(), Some("sk-test".to_string()));
        let request = LlmRequest {
            system_prompt: Some("Be helpful.".to_string()),
            messages: vec![ChatMessage::user("Hello").with_name("Editor")],
            temperature: Some(0.5),
            max_tokens: Some(512),
            ..Default::default()
        };

        let json = serde_json::to_value(client.build_request_body(&request)).unwrap();

        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["stream"], true);
        assert_eq!(json["temperature"], 0.5);
        assert_eq!(json["max_tokens"], 512);
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());

        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "Be helpful.");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["name"], "Editor");
    }

    #[test]
    fn request_body_advertises_tools() {
        let client = OpenAiClient::new(None, "gpt-4o".to_string(), None);
        let request = LlmRequest {
            messages: vec![
                ChatMessage::user("go"),
                ChatMessage::assistant_tool_calls(
                    "",
                    vec![ToolCallRequest {
                        id: "call_1".into(),
                        name: "web_search".into(),
                        arguments: "{\"query\":\"x\"}".into(),
                    }],
                ),
                ChatMessage::tool_result("call_1", "result"),
            ],
            tools: vec![ToolSpec {
                name: "web_search".into(),
                description: "Search the web".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            tool_choice: Some(ToolChoice::Required),
            ..Default::default()
        };

        let json = serde_json::to_value(client.build_request_body(&request)).unwrap();
        assert_eq!(json["tool_choice"], "required");
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["name"], "web_search");

        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages[1]["tool_calls"][0]["id"], "call_1");
        assert_eq!(messages[1]["tool_calls"][0]["type"], "function");
        assert_eq!(messages[2]["role"], "tool");
        assert_eq!(messages[2]["tool_call_id"], "call_1");
    }

    #[test]
    fn defaults_fill_unset_sampling() {
        let client = OpenAiClient::new(None, "gpt-4o".to_string(), None)
            .with_defaults(Some(0.2), Some(2048));
        let json = serde_json::to_value(client.build_request_body(&LlmRequest::default())).unwrap();
        assert_eq!(json["max_tokens"], 2048);
        assert!((json["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_name("Editor"), "Editor");
        assert_eq!(sanitize_name("Senior Editor!"), "Senior_Editor_");
    }

    #[tokio::test]
    async fn decodes_text_then_done() {
        let chunks: Vec<StreamChunk> = decode_chunks(lines(&[
            r#"{"choices":[{"delta":{"role":"assistant","content":""},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{"content":" world"},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        ]))
        .map(|c| c.unwrap())
        .collect()
        .await;

        assert_eq!(
            chunks,
            vec![
                StreamChunk::Text("Hello".into()),
                StreamChunk::Text(" world".into()),
                StreamChunk::Done {
                    finish_reason: Some("stop".into())
                },
            ]
        );
    }

    #[tokio::test]
    async fn assembles_split_tool_calls() {
        let chunks: Vec<StreamChunk> = decode_chunks(lines(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","type":"function","function":{"name":"web_search","arguments":""}}]},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"query\":"}}]},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"cold brew\"}"}}]},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        ]))
        .map(|c| c.unwrap())
        .collect()
        .await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0],
            StreamChunk::ToolCall(ToolCallRequest {
                id: "call_a".into(),
                name: "web_search".into(),
                arguments: "{\"query\":\"cold brew\"}".into(),
            })
        );
        assert!(matches!(chunks[1], StreamChunk::Done { .. }));
    }

    #[tokio::test]
    async fn malformed_chunk_is_upstream_error() {
        let items: Vec<Result<StreamChunk>> = decode_chunks(lines(&["not json", "{}"]))
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(QuillError::UpstreamModel(_))));
    }

    #[test]
    fn default_base_url_is_openai() {
        let client = OpenAiClient::new(None, "gpt-4o".to_string(), None);
        assert_eq!(client.base_url, "https://api.openai.com");

        let local = OpenAiClient::new(
            Some("http://localhost:11434/".into()),
            "llama3".to_string(),
            None,
        );
        assert_eq!(local.base_url, "http://localhost:11434");
    }
}
