//! Error types for quill.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuillError {
    /// The writing brief could not be decoded from the caller's message.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A model call or a tool call made on the model's behalf failed.
    #[error("Upstream model error: {0}")]
    UpstreamModel(String),

    /// Releasing a per-session resource failed.
    #[error("Resource cleanup error: {0}")]
    ResourceCleanup(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QuillError {
    /// Whether this error came from the model side of an invocation.
    pub fn is_upstream(&self) -> bool {
        matches!(self, QuillError::UpstreamModel(_) | QuillError::Tool(_))
    }
}

pub type Result<T> = std::result::Result<T, QuillError>;
