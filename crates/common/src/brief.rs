//! The writing brief that drives one orchestration session.

use crate::{QuillError, Result};
use serde::{Deserialize, Serialize};

/// Immutable input to a session.
///
/// On the wire the brief is a YAML document with the keys `research`,
/// `products` and `writing`; all three are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WritingBrief {
    pub research: String,
    pub products: String,
    #[serde(rename = "writing")]
    pub assignment: String,
}

impl WritingBrief {
    pub fn new(
        research: impl Into<String>,
        products: impl Into<String>,
        assignment: impl Into<String>,
    ) -> Self {
        Self {
            research: research.into(),
            products: products.into(),
            assignment: assignment.into(),
        }
    }

    /// Decode a brief from the YAML text of a chat message.
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| QuillError::Decode(e.to_string()))
    }
}
