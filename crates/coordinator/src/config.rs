//! Configuration for the writer service.
//!
//! # Security
//!
//! - Config file permission validation on Unix systems
//! - Rejects world-readable files containing API keys
//! - Warns about API keys stored in config files

use std::collections::BTreeMap;

use quill_agents::{AgentRoster, DEFAULT_ACCEPTANCE_PHRASE, DEFAULT_MAX_TOOL_ROUNDS};
use quill_common::QuillError;
use quill_llm::LlmConfig;
use quill_search::{ProductSearchConfig, WebSearchConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Main service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuillConfig {
    /// Model provider used by every agent
    pub llm: LlmConfig,

    /// Pipeline limits and termination
    pub orchestration: OrchestrationConfig,

    pub web_search: WebSearchConfig,

    pub product_search: ProductSearchConfig,

    /// Per-agent overrides, keyed by agent name
    pub agents: BTreeMap<String, AgentOverride>,

    /// Externally allocated per-session resources
    pub resources: ResourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Stop the writer/editor loop after this many turns. Unbounded when unset.
    pub max_turns: Option<usize>,

    /// Tool-call rounds allowed within one agent invocation
    pub max_tool_rounds: usize,

    /// Editor phrase that ends the loop, matched ignoring case
    pub acceptance_phrase: String,

    /// Deadline for a whole streamed session
    pub session_timeout_secs: Option<u64>,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_turns: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            acceptance_phrase: DEFAULT_ACCEPTANCE_PHRASE.into(),
            session_timeout_secs: None,
        }
    }
}

impl OrchestrationConfig {
    /// Reject settings the loop cannot run with.
    pub fn validate(&self) -> quill_common::Result<()> {
        if self.acceptance_phrase.trim().is_empty() {
            return Err(QuillError::Config(
                "orchestration.acceptance_phrase must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Replaces parts of a built-in agent definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentOverride {
    /// Instruction template with `{{ variable }}` placeholders
    pub instructions: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
    /// Agent service that receives a per-session researcher registration.
    /// Disabled when unset.
    pub remote_agent_endpoint: Option<String>,

    pub api_key: Option<String>,
}

impl QuillConfig {
    /// Load configuration from a TOML file.
    ///
    /// On Unix systems, this validates that:
    /// - The file is a regular file (not a symlink)
    /// - The file is not world-readable if it contains an API key
    /// - Warns if API keys are stored in the config file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        let config = Self::from_file_unchecked(path)?;

        if config.has_inline_api_keys() {
            warn!(
                "API key found in config file '{}'. For better security, \
                 use environment variables instead (OPENAI_API_KEY, BING_SEARCH_API_KEY).",
                path.display()
            );
        }

        Ok(config)
    }

    /// Load configuration from a TOML file without permission checks.
    ///
    /// Use this only for testing or when you've already validated the file.
    pub fn from_file_unchecked(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.orchestration.validate()?;
        Ok(config)
    }

    fn has_inline_api_keys(&self) -> bool {
        self.llm.api_key.is_some()
            || self.web_search.api_key.is_some()
            || self.product_search.api_key.is_some()
            || self.resources.api_key.is_some()
    }

    /// Built-in roster with the configured overrides applied.
    pub fn roster(&self) -> quill_common::Result<AgentRoster> {
        let mut roster = AgentRoster::default();
        for (agent, overrides) in &self.agents {
            if let Some(ref instructions) = overrides.instructions {
                roster = roster.with_instructions(agent, instructions.clone())?;
            }
            roster = roster.with_sampling(agent, overrides.temperature, overrides.max_tokens)?;
        }
        Ok(roster)
    }
}

/// Validate config file permissions on Unix systems.
///
/// Requirements:
/// - File must be a regular file (not symlink, directory, etc.)
/// - File must not be world-writable (mode & 0o002 == 0)
/// - If file contains API key patterns, must not be world-readable
#[cfg(unix)]
fn validate_config_file_permissions(path: &std::path::Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::symlink_metadata(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

    if !metadata.is_file() {
        anyhow::bail!(
            "Config path '{}' is not a regular file. Symlinks and directories are not allowed.",
            path.display()
        );
    }

    let permission_bits = metadata.permissions().mode() & 0o777;

    if permission_bits & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {:04o}). Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    let content = std::fs::read_to_string(path)?;
    let has_api_key =
        content.contains("api_key") && (content.contains("sk-") || content.contains("key ="));

    if has_api_key && permission_bits & 0o004 != 0 {
        anyhow::bail!(
            "Config file '{}' contains an API key but is world-readable (mode {:04o}). \
             Fix with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    if has_api_key && permission_bits & 0o040 != 0 {
        warn!(
            "Config file '{}' contains an API key and is group-readable (mode {:04o}). \
             Consider restricting access with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    Ok(())
}
