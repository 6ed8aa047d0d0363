//! Wire types for the chat streaming endpoint.

use quill_common::{ChatRole, Fragment};
use serde::{Deserialize, Serialize};

/// Request body of `POST /chat/stream`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatRequestMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_state: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatRequestMessage {
    pub role: String,
    pub content: String,
}

impl ChatRequest {
    /// Content of the last message, which carries the YAML brief.
    pub fn last_content(&self) -> Option<&str> {
        self.messages.last().map(|m| m.content.as_str())
    }
}

/// One NDJSON line of the streamed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDelta {
    pub delta: DeltaBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaBody {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<DeltaContext>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaContext {
    pub name: String,
}

impl From<Fragment> for ChatDelta {
    fn from(fragment: Fragment) -> Self {
        Self {
            delta: DeltaBody {
                role: fragment.role,
                content: fragment.content,
                context: fragment.author_name.map(|name| DeltaContext { name }),
            },
        }
    }
}

impl ChatDelta {
    /// Serialize as one `\r\n`-terminated line.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push_str("\r\n");
        Ok(line)
    }
}
