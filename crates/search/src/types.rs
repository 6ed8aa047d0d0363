//! Search records and configuration.

use std::path::PathBuf;

use quill_common::{QuillError, Result};
use serde::{Deserialize, Serialize};

/// One product in the catalog, with its precomputed embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub key: String,
    pub name: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub name: String,
    pub content: String,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub score: f32,
}

impl SearchHit {
    /// The line handed back to the model.
    pub fn to_line(&self) -> String {
        format!("{}: {}", self.name, self.content)
    }
}

/// Configuration for the web search tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Number of results to return to the model.
    pub count: u32,
    pub market: Option<String>,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.bing.microsoft.com/v7.0/search".into(),
            api_key: None,
            count: 5,
            market: None,
        }
    }
}

impl WebSearchConfig {
    /// Config value first, then `BING_SEARCH_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var("BING_SEARCH_API_KEY").ok())
    }
}

/// Configuration for the product search tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductSearchConfig {
    pub enabled: bool,
    /// Base URL of an OpenAI-compatible embeddings API.
    pub embedding_url: Option<String>,
    pub embedding_model: String,
    pub api_key: Option<String>,
    /// JSON file holding an array of [`ProductRecord`].
    pub catalog_path: Option<PathBuf>,
    pub top_k: usize,
}

impl Default for ProductSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            embedding_url: None,
            embedding_model: "text-embedding-3-large".into(),
            api_key: None,
            catalog_path: None,
            top_k: 3,
        }
    }
}

impl ProductSearchConfig {
    /// Config value first, then `OPENAI_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

/// Pull the required `query` string out of a tool's arguments.
pub fn query_argument(arguments: &serde_json::Value) -> Result<&str> {
    arguments
        .get("query")
        .and_then(|q| q.as_str())
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| QuillError::Tool("missing required argument 'query'".into()))
}

/// JSON schema shared by both search tools.
pub fn query_schema(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": description,
            }
        },
        "required": ["query"],
    })
}
