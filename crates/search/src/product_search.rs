//! The `product_search` tool used by the marketing agent.

use std::sync::Arc;

use async_trait::async_trait;
use quill_common::{Result, Tool, ToolCapability};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::embedding::Embedder;
use crate::store::ProductIndex;
use crate::types::{query_argument, query_schema};

pub const PRODUCT_SEARCH_TOOL: &str = "product_search";

const NO_MATCHES: &str = "No matching products found.";

pub struct ProductSearchTool {
    embedder: Arc<dyn Embedder>,
    index: Arc<ProductIndex>,
    top_k: usize,
}

impl ProductSearchTool {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<ProductIndex>, top_k: usize) -> Self {
        Self {
            embedder,
            index,
            top_k: top_k.max(1),
        }
    }
}

#[async_trait]
impl Tool for ProductSearchTool {
    fn capability(&self) -> ToolCapability {
        ToolCapability::ProductSearch
    }

    fn name(&self) -> &str {
        PRODUCT_SEARCH_TOOL
    }

    fn description(&self) -> &str {
        "Search the company's product catalog for products matching a description."
    }

    fn parameters(&self) -> Value {
        query_schema("What kind of product to look for")
    }

    #[instrument(skip(self, arguments), fields(tool = PRODUCT_SEARCH_TOOL))]
    async fn call(&self, arguments: Value) -> Result<String> {
        let query = query_argument(&arguments)?;
        let vector = self.embedder.embed(query).await?;
        let hits = self.index.search(&vector, self.top_k)?;
        debug!(query, hits = hits.len(), "Product search finished");

        if hits.is_empty() {
            return Ok(NO_MATCHES.to_string());
        }
        Ok(hits
            .iter()
            .map(|hit| hit.to_line())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
