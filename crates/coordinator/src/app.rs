//! Long-lived application state and the per-request session factory.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use quill_agents::{
    AgentInvoker, AgentRoster, ModelInvoker, PhaseRunner, ToolInvocationRecorder, ToolRegistry,
};
use quill_common::{QuillError, Result};
use quill_llm::{LlmClient, build_llm_client};
use quill_search::{OpenAiEmbedder, ProductIndex, ProductSearchTool, WebSearchTool};
use tracing::{info, warn};

use crate::config::{OrchestrationConfig, QuillConfig};
use crate::resources::{RemoteAgentAllocator, ResourceAllocator, SessionResources};
use crate::session::SessionOrchestrator;

/// Everything sessions share read-only: definitions, tools and the model
/// client.
pub struct WriterApp {
    roster: AgentRoster,
    client: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    orchestration: OrchestrationConfig,
    allocator: Option<Arc<dyn ResourceAllocator>>,
    record_tool_calls: bool,
    next_session_id: AtomicU64,
}

impl WriterApp {
    pub fn new(roster: AgentRoster, client: Arc<dyn LlmClient>, tools: ToolRegistry) -> Self {
        for definition in roster.definitions() {
            let missing = tools.missing_capabilities(definition);
            if !missing.is_empty() {
                warn!(
                    agent = %definition.name,
                    missing = ?missing,
                    "Agent declares tools that are not registered; it will run without them"
                );
            }
        }

        Self {
            roster,
            client,
            tools: Arc::new(tools),
            orchestration: OrchestrationConfig::default(),
            allocator: None,
            record_tool_calls: true,
            next_session_id: AtomicU64::new(1),
        }
    }

    pub fn with_orchestration(mut self, orchestration: OrchestrationConfig) -> Self {
        self.orchestration = orchestration;
        self
    }

    pub fn with_allocator(mut self, allocator: Arc<dyn ResourceAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    /// Whether tool calls are streamed to callers as notices. On by default.
    pub fn with_tool_notices(mut self, enabled: bool) -> Self {
        self.record_tool_calls = enabled;
        self
    }

    /// Build the app from configuration: model client, tools, roster and
    /// optional remote resources.
    pub async fn from_config(config: &QuillConfig) -> anyhow::Result<Self> {
        config.orchestration.validate()?;
        let client = build_llm_client(&config.llm)?;
        let roster = config.roster()?;

        let mut tools = ToolRegistry::new();
        if config.web_search.enabled {
            let tool = WebSearchTool::new(&config.web_search);
            tools.register(Arc::new(tool));
        }
        if config.product_search.enabled {
            match config.product_search.catalog_path {
                Some(ref path) => {
                    let index = ProductIndex::load(path).await?;
                    let embedder = OpenAiEmbedder::new(
                        config.product_search.embedding_url.clone(),
                        config.product_search.embedding_model.clone(),
                        config.product_search.resolve_api_key(),
                    );
                    tools.register(Arc::new(ProductSearchTool::new(
                        Arc::new(embedder),
                        Arc::new(index),
                        config.product_search.top_k,
                    )));
                }
                None => warn!("product_search.catalog_path is not set; product search is disabled"),
            }
        }

        let mut app = Self::new(roster, client, tools).with_orchestration(config.orchestration.clone());
        if let Some(ref endpoint) = config.resources.remote_agent_endpoint {
            info!(endpoint = %endpoint, "Remote agent registration enabled");
            app = app.with_allocator(Arc::new(RemoteAgentAllocator::new(
                endpoint.clone(),
                config.resources.api_key.clone(),
            )));
        }

        info!(
            model = %app.client.model_name(),
            tools = app.tools.len(),
            max_turns = ?app.orchestration.max_turns,
            "Writer app ready"
        );
        Ok(app)
    }

    pub fn orchestration(&self) -> &OrchestrationConfig {
        &self.orchestration
    }

    pub fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    /// Create a session for one request, allocating its resources.
    pub async fn create_session(&self) -> Result<SessionOrchestrator> {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        let resources = match self.allocator {
            Some(ref allocator) => SessionResources::new(allocator.allocate(&self.roster).await.map_err(
                |e| match e {
                    QuillError::UpstreamModel(_) => e,
                    other => QuillError::UpstreamModel(other.to_string()),
                },
            )?),
            None => SessionResources::default(),
        };

        let invoker = ModelInvoker::new(self.client.clone(), self.tools.clone())
            .with_max_tool_rounds(self.orchestration.max_tool_rounds);
        let invoker: Arc<dyn AgentInvoker> = if self.record_tool_calls {
            Arc::new(ToolInvocationRecorder::new(invoker))
        } else {
            Arc::new(invoker)
        };

        info!(session_id = id, resources = resources.len(), "Created session");

        Ok(SessionOrchestrator::new(
            id,
            self.roster.clone(),
            PhaseRunner::new(invoker),
            self.orchestration.clone(),
            resources,
        ))
    }
}
