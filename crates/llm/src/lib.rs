pub mod client;
pub mod config;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod sse;

pub use client::{
    ChatMessage, ChunkStream, LlmClient, LlmRequest, Role, StreamChunk, ToolCallRequest,
    ToolChoice, ToolSpec,
};
pub use config::{LlmConfig, SemaphoredClient, build_llm_client};
pub use mock::{MockClient, MockResponse};
pub use openai::OpenAiClient;
pub use retry::{RetryConfig, RetryingClient};
