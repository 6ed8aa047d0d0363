//! Named text entries threaded from one phase into the next.

use crate::{QuillError, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Ordered mapping from template variable name to text.
///
/// Entries are written once. A context is extended by building a new one
/// with [`PhaseContext::with`], so a context handed to an agent can never
/// change underneath it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseContext {
    entries: Vec<(String, String)>,
}

impl PhaseContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of this context with one more entry.
    ///
    /// Fails if `key` is already present.
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if self.contains(&key) {
            return Err(QuillError::Config(format!(
                "context entry '{key}' is already set"
            )));
        }
        let mut entries = self.entries.clone();
        entries.push((key, value.into()));
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for PhaseContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Build a context from literal pairs, rejecting duplicate keys.
impl<K, V> TryFrom<Vec<(K, V)>> for PhaseContext
where
    K: Into<String>,
    V: Into<String>,
{
    type Error = QuillError;

    fn try_from(pairs: Vec<(K, V)>) -> Result<Self> {
        pairs
            .into_iter()
            .try_fold(PhaseContext::new(), |ctx, (k, v)| ctx.with(k, v))
    }
}
