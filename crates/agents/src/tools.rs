//! Tool plugins available to agents, resolved by capability.

use std::sync::Arc;

use quill_common::{AgentDefinition, Tool, ToolCapability};
use quill_llm::ToolSpec;

/// Shared set of tool plugins.
///
/// An agent sees exactly the tools whose capability appears in its
/// definition.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Tools the given agent may call, in registration order.
    pub fn tools_for(&self, definition: &AgentDefinition) -> Vec<Arc<dyn Tool>> {
        self.tools
            .iter()
            .filter(|tool| definition.has_capability(tool.capability()))
            .cloned()
            .collect()
    }

    /// Capabilities the agent declares that no registered tool provides.
    pub fn missing_capabilities(&self, definition: &AgentDefinition) -> Vec<ToolCapability> {
        definition
            .capabilities
            .iter()
            .copied()
            .filter(|cap| !self.tools.iter().any(|tool| tool.capability() == *cap))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tools.iter().map(|t| t.name()))
            .finish()
    }
}

/// Function definition advertised to the model for one tool.
pub fn tool_spec(tool: &dyn Tool) -> ToolSpec {
    ToolSpec {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.parameters(),
    }
}
