//! Agent definitions and the tool plugin trait.
//!
//! These live in `quill-common` so that the agents, search and coordinator
//! crates can all reference them without circular dependencies.

use crate::{PhaseContext, QuillError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// External capabilities an agent may call mid-generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCapability {
    /// Web search grounding
    WebSearch,
    /// Vector search over the product catalog
    ProductSearch,
}

/// Static description of one agent role.
///
/// Loaded once and shared read-only by every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Agent name, used to tag its output.
    pub name: String,

    /// Instructions template, rendered against the phase context with
    /// `{{ variable }}` placeholders.
    pub instructions: String,

    /// Tools this agent may call.
    #[serde(default)]
    pub capabilities: BTreeSet<ToolCapability>,

    /// Force the first model round to call a tool.
    #[serde(default)]
    pub require_tool_use: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            capabilities: BTreeSet::new(),
            require_tool_use: false,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_capability(mut self, capability: ToolCapability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn requiring_tool_use(mut self) -> Self {
        self.require_tool_use = true;
        self
    }

    pub fn has_capability(&self, capability: ToolCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Render the instructions against `context`.
    ///
    /// A variable the template uses but the context lacks is a
    /// `Template` error.
    pub fn render_instructions(&self, context: &PhaseContext) -> Result<String> {
        let mut env = minijinja::Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        env.render_str(&self.instructions, context)
            .map_err(|e| QuillError::Template(format!("agent {}: {e}", self.name)))
    }
}

/// A tool plugin an agent can invoke through the model's function calling.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Capability this tool provides.
    fn capability(&self) -> ToolCapability;

    /// Function name advertised to the model.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> serde_json::Value;

    /// Run the tool and return text for the model.
    async fn call(&self, arguments: serde_json::Value) -> Result<String>;
}
