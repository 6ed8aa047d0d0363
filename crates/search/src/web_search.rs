//! The `web_search` tool used by the research agent, backed by the Bing
//! Web Search v7 API.

use async_trait::async_trait;
use quill_common::{QuillError, Result, Tool, ToolCapability};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::types::{WebSearchConfig, query_argument, query_schema};

pub const WEB_SEARCH_TOOL: &str = "web_search";

const NO_RESULTS: &str = "No web results found.";

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct BingResponse {
    #[serde(default)]
    web_pages: Option<BingWebPages>,
}

#[derive(Debug, Deserialize)]
struct BingWebPages {
    #[serde(default)]
    value: Vec<BingWebPage>,
}

#[derive(Debug, Deserialize)]
struct BingWebPage {
    name: String,
    url: String,
    #[serde(default)]
    snippet: String,
}

pub struct WebSearchTool {
    endpoint: String,
    api_key: Option<String>,
    count: u32,
    market: Option<String>,
    http_client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(config: &WebSearchConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.resolve_api_key(),
            count: config.count.max(1),
            market: config.market.clone(),
            http_client: reqwest::Client::new(),
        }
    }
}

/// Render search results as numbered text for the model.
fn format_results(response: BingResponse, count: usize) -> String {
    let pages = response.web_pages.map(|p| p.value).unwrap_or_default();
    if pages.is_empty() {
        return NO_RESULTS.to_string();
    }
    pages
        .into_iter()
        .take(count)
        .enumerate()
        .map(|(i, page)| format!("{}. {} ({})\n{}", i + 1, page.name, page.url, page.snippet))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Tool for WebSearchTool {
    fn capability(&self) -> ToolCapability {
        ToolCapability::WebSearch
    }

    fn name(&self) -> &str {
        WEB_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns titles, URLs and snippets."
    }

    fn parameters(&self) -> Value {
        query_schema("The search query")
    }

    #[instrument(skip(self, arguments), fields(tool = WEB_SEARCH_TOOL))]
    async fn call(&self, arguments: Value) -> Result<String> {
        let query = query_argument(&arguments)?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| QuillError::Tool("web search API key is not configured".into()))?;

        let count = self.count.to_string();
        let mut params = vec![("q", query), ("count", count.as_str())];
        if let Some(ref market) = self.market {
            params.push(("mkt", market.as_str()));
        }

        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&params)
            .header("Ocp-Apim-Subscription-Key", api_key)
            .send()
            .await
            .map_err(|e| QuillError::Tool(format!("web search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuillError::Tool(format!("web search error {status}: {body}")));
        }

        let parsed: BingResponse = response
            .json()
            .await
            .map_err(|e| QuillError::Tool(format!("invalid web search response: {e}")))?;

        let text = format_results(parsed, self.count as usize);
        debug!(query, bytes = text.len(), "Web search finished");
        Ok(text)
    }
}
