//! Scripted model client for deterministic tests without API calls.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use quill_common::{QuillError, Result};

use crate::client::{ChunkStream, LlmClient, LlmRequest, StreamChunk, ToolCallRequest};

/// One pre-programmed model response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Stream these text pieces, then finish.
    Text(Vec<String>),
    /// Ask for these tool calls, then finish.
    ToolCalls(Vec<ToolCallRequest>),
    /// Fail to open the stream.
    Error(String),
    /// Stream these pieces, then fail mid-stream.
    FailAfter(Vec<String>, String),
    /// Stream these pieces and end without a finish signal.
    Truncated(Vec<String>),
    /// Wait before answering with the inner response.
    Delayed(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// A single-chunk text response.
    pub fn text(text: &str) -> Self {
        Self::Text(vec![text.to_string()])
    }

    /// A text response split into several chunks.
    pub fn chunks(parts: &[&str]) -> Self {
        Self::Text(parts.iter().map(|p| p.to_string()).collect())
    }

    /// A single tool call with JSON arguments.
    pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        Self::ToolCalls(vec![ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }])
    }

    /// Answer with `response` after `delay`.
    pub fn delayed(delay: Duration, response: MockResponse) -> Self {
        Self::Delayed(delay, Box::new(response))
    }

    fn into_stream(self) -> Result<ChunkStream> {
        let done = || {
            Ok(StreamChunk::Done {
                finish_reason: Some("stop".into()),
            })
        };
        let text = |parts: Vec<String>| parts.into_iter().map(|p| Ok(StreamChunk::Text(p)));

        let items: Vec<Result<StreamChunk>> = match self {
            MockResponse::Text(parts) => text(parts).chain(std::iter::once(done())).collect(),
            MockResponse::ToolCalls(calls) => calls
                .into_iter()
                .map(|c| Ok(StreamChunk::ToolCall(c)))
                .chain(std::iter::once(Ok(StreamChunk::Done {
                    finish_reason: Some("tool_calls".into()),
                })))
                .collect(),
            MockResponse::Error(message) => return Err(QuillError::UpstreamModel(message)),
            MockResponse::FailAfter(parts, message) => text(parts)
                .chain(std::iter::once(Err(QuillError::UpstreamModel(message))))
                .collect(),
            MockResponse::Truncated(parts) => text(parts).collect(),
            MockResponse::Delayed(_, inner) => return inner.into_stream(),
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

type Responder = Box<dyn Fn(&LlmRequest) -> MockResponse + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<MockResponse>>),
    Responder(Responder),
}

/// Model client that answers from a script and records every request.
pub struct MockClient {
    script: Script,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockClient {
    /// Answer calls in order from `responses`. Calls past the end fail.
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            script: Script::Queue(Mutex::new(responses.into())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer each call by inspecting the request.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&LlmRequest) -> MockResponse + Send + Sync + 'static,
    {
        Self {
            script: Script::Responder(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockClient {
    async fn stream(&self, request: LlmRequest) -> Result<ChunkStream> {
        let response = match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .map_err(|_| QuillError::UpstreamModel("mock script poisoned".into()))?
                .pop_front()
                .ok_or_else(|| {
                    QuillError::UpstreamModel(format!(
                        "MockClient: no response configured for call {}",
                        self.call_count()
                    ))
                })?,
            Script::Responder(responder) => responder(&request),
        };

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        if let MockResponse::Delayed(delay, _) = &response {
            tokio::time::sleep(*delay).await;
        }
        response.into_stream()
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}
