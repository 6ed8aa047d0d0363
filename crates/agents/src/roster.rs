//! The four agents of the creative-writer pipeline.

use std::sync::Arc;

use quill_common::{AgentDefinition, QuillError, Result, ToolCapability};

pub const RESEARCHER_NAME: &str = "Researcher";
pub const MARKETING_NAME: &str = "Marketing";
pub const WRITER_NAME: &str = "Writer";
pub const EDITOR_NAME: &str = "Editor";

const RESEARCHER_INSTRUCTIONS: &str = r#"You are a researcher helping a writer prepare an article.

Research the following topic using the web_search tool. Search for recent,
authoritative information and collect the facts a writer would need.

# Topic
{{ research_context }}

Reply with a concise list of findings. Give each finding a short title, one
or two sentences of explanation and the source URL.
"#;

const MARKETING_INSTRUCTIONS: &str = r#"You are a marketing specialist who knows the company's product catalog.

Use the product_search tool to find the products that match the request
below. Only report products the tool returns.

# Product request
{{ product_context }}

Reply with each matching product's name and a short description of what
makes it a good fit.
"#;

const WRITER_INSTRUCTIONS: &str = r#"You are a writer for a company's online magazine. You write engaging,
accurate articles based on research and the products the company sells.

# Research topic
{{ research_context }}

# Research findings
{{ research_results }}

# Product request
{{ product_context }}

# Matching products
{{ product_results }}

# Assignment
{{ assignment }}

Write the article the assignment asks for, grounded in the findings and
products above. When the editor gives feedback, revise the full article and
reply with the complete new version.
"#;

const EDITOR_INSTRUCTIONS: &str = r#"You are the editor of a company's online magazine. Review the writer's
latest draft for accuracy, clarity, tone and whether it fulfils the
assignment.

If the draft needs work, reply with specific, actionable feedback and do not
rewrite the article yourself.

If the draft is ready to publish, reply with "Article accepted, no further
rework necessary." and nothing else.
"#;

/// Definitions shared read-only by every session.
#[derive(Debug, Clone)]
pub struct AgentRoster {
    pub researcher: Arc<AgentDefinition>,
    pub marketer: Arc<AgentDefinition>,
    pub writer: Arc<AgentDefinition>,
    pub editor: Arc<AgentDefinition>,
}

impl Default for AgentRoster {
    fn default() -> Self {
        Self {
            researcher: Arc::new(
                AgentDefinition::new(RESEARCHER_NAME, RESEARCHER_INSTRUCTIONS)
                    .with_capability(ToolCapability::WebSearch)
                    .requiring_tool_use(),
            ),
            marketer: Arc::new(
                AgentDefinition::new(MARKETING_NAME, MARKETING_INSTRUCTIONS)
                    .with_capability(ToolCapability::ProductSearch)
                    .requiring_tool_use(),
            ),
            writer: Arc::new(AgentDefinition::new(WRITER_NAME, WRITER_INSTRUCTIONS)),
            editor: Arc::new(AgentDefinition::new(EDITOR_NAME, EDITOR_INSTRUCTIONS)),
        }
    }
}

impl AgentRoster {
    /// Replace one agent's instruction template, keeping its name and tools.
    pub fn with_instructions(mut self, agent: &str, instructions: impl Into<String>) -> Result<Self> {
        let slot = self.slot_mut(agent)?;
        let mut definition = (**slot).clone();
        definition.instructions = instructions.into();
        *slot = Arc::new(definition);
        Ok(self)
    }

    /// Apply sampling settings to one agent.
    pub fn with_sampling(
        mut self,
        agent: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<Self> {
        let slot = self.slot_mut(agent)?;
        let mut definition = (**slot).clone();
        definition.temperature = temperature.or(definition.temperature);
        definition.max_tokens = max_tokens.or(definition.max_tokens);
        *slot = Arc::new(definition);
        Ok(self)
    }

    pub fn get(&self, agent: &str) -> Option<&Arc<AgentDefinition>> {
        self.definitions().find(|d| d.name.eq_ignore_ascii_case(agent))
    }

    /// All definitions in pipeline order.
    pub fn definitions(&self) -> impl Iterator<Item = &Arc<AgentDefinition>> {
        [&self.researcher, &self.marketer, &self.writer, &self.editor].into_iter()
    }

    fn slot_mut(&mut self, agent: &str) -> Result<&mut Arc<AgentDefinition>> {
        let slot = if agent.eq_ignore_ascii_case(RESEARCHER_NAME) {
            &mut self.researcher
        } else if agent.eq_ignore_ascii_case(MARKETING_NAME) {
            &mut self.marketer
        } else if agent.eq_ignore_ascii_case(WRITER_NAME) {
            &mut self.writer
        } else if agent.eq_ignore_ascii_case(EDITOR_NAME) {
            &mut self.editor
        } else {
            return Err(QuillError::Config(format!("Unknown agent: {agent}")));
        };
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_common::PhaseContext;

    #[test]
    fn default_capabilities() {
        let roster = AgentRoster::default();
        assert!(roster.researcher.has_capability(ToolCapability::WebSearch));
        assert!(roster.researcher.require_tool_use);
        assert!(roster.marketer.has_capability(ToolCapability::ProductSearch));
        assert!(roster.writer.capabilities.is_empty());
        assert!(roster.editor.capabilities.is_empty());
        assert!(!roster.editor.require_tool_use);
    }

    #[test]
    fn writer_template_uses_loop_context() {
        let roster = AgentRoster::default();
        let context = PhaseContext::try_from(vec![
            ("research_context", "coffee"),
            ("research_results", "cold brew"),
            ("product_context", "beans"),
            ("product_results", "Ethiopian single origin"),
            ("assignment", "teaser"),
        ])
        .unwrap();
        let rendered = roster.writer.render_instructions(&context).unwrap();
        for value in ["coffee", "cold brew", "beans", "Ethiopian single origin", "teaser"] {
            assert!(rendered.contains(value), "missing {value}");
        }
    }

    #[test]
    fn editor_names_acceptance_phrase() {
        let roster = AgentRoster::default();
        let rendered = roster.editor.render_instructions(&PhaseContext::new()).unwrap();
        assert!(rendered.to_lowercase().contains("article accepted"));
    }

    #[test]
    fn override_keeps_capabilities() {
        let roster = AgentRoster::default()
            .with_instructions("researcher", "Look up {{ research_context }}")
            .unwrap();
        assert_eq!(roster.researcher.instructions, "Look up {{ research_context }}");
        assert!(roster.researcher.has_capability(ToolCapability::WebSearch));
        assert_eq!(roster.researcher.name, RESEARCHER_NAME);
    }

    #[test]
    fn override_unknown_agent_fails() {
        let err = AgentRoster::default()
            .with_instructions("Publisher", "x")
            .unwrap_err();
        assert!(matches!(err, QuillError::Config(_)));
    }

    #[test]
    fn sampling_override() {
        let roster = AgentRoster::default()
            .with_sampling(EDITOR_NAME, Some(0.2), None)
            .unwrap();
        assert_eq!(roster.editor.temperature, Some(0.2));
        assert_eq!(roster.editor.max_tokens, None);
        assert!(roster.get("editor").is_some());
        assert_eq!(roster.definitions().count(), 4);
    }
}
