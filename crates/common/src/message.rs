//! Messages exchanged between agents and fragments streamed to callers.

use serde::{Deserialize, Serialize};

/// Role attached to a streamed fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChatRole {
    System,
    Assistant,
    User,
}

/// A complete message produced by one agent turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Name of the agent that produced the message.
    pub author: String,

    /// Full message text.
    pub content: String,
}

impl Message {
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
        }
    }

    pub fn is_from(&self, agent: &str) -> bool {
        self.author == agent
    }
}

/// One incremental unit of output, in the order it was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub role: ChatRole,

    /// Agent that produced the fragment. Absent for plain system notices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,

    pub content: String,

    /// True when the fragment announces a tool call rather than carrying
    /// agent output.
    #[serde(default)]
    pub is_tool_notice: bool,
}

impl Fragment {
    /// Untagged assistant content, as produced by an invoker.
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            author_name: None,
            content: content.into(),
            is_tool_notice: false,
        }
    }

    /// A system-role notice with no author.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            author_name: None,
            content: content.into(),
            is_tool_notice: false,
        }
    }

    /// Notice that a tool is about to be called with the given arguments.
    pub fn tool_notice(tool_name: &str, arguments: &serde_json::Value) -> Self {
        Self {
            role: ChatRole::System,
            author_name: None,
            content: format!("{tool_name}: {arguments}"),
            is_tool_notice: true,
        }
    }

    /// Attach the producing agent's name.
    pub fn tagged(mut self, agent: impl Into<String>) -> Self {
        self.author_name = Some(agent.into());
        self
    }

    /// Whether this fragment carries agent output that belongs in the
    /// agent's accumulated text.
    pub fn is_content(&self) -> bool {
        !self.is_tool_notice && self.role == ChatRole::Assistant
    }
}

/// Append-only history of the writer/editor loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopHistory {
    messages: Vec<Message>,
}

impl LoopHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
