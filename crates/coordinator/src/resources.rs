//! Resources allocated for one session and released when it ends.
//!
//! A session's resources are held by a [`SessionResources`] guard. The
//! orchestrator releases them explicitly when its stream finishes, whether
//! it completed or failed. If the stream is dropped early instead, the
//! guard's `Drop` hands the release to the running tokio runtime.

use async_trait::async_trait;
use quill_agents::AgentRoster;
use quill_common::{AgentDefinition, QuillError, Result, ToolCapability};
use quill_search::{PRODUCT_SEARCH_TOOL, WEB_SEARCH_TOOL};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Something external that must be cleaned up after a session.
#[async_trait]
pub trait SessionResource: Send + Sync {
    /// Short label for logs.
    fn describe(&self) -> String;

    async fn release(&self) -> Result<()>;
}

/// Creates the per-session resources when a session is built.
#[async_trait]
pub trait ResourceAllocator: Send + Sync {
    async fn allocate(&self, roster: &AgentRoster) -> Result<Vec<Box<dyn SessionResource>>>;
}

/// Guard over a session's resources.
#[derive(Default)]
pub struct SessionResources {
    resources: Vec<Box<dyn SessionResource>>,
}

impl SessionResources {
    pub fn new(resources: Vec<Box<dyn SessionResource>>) -> Self {
        Self { resources }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Release everything. Failures are logged, not returned.
    ///
    /// Returns the number of resources that failed to release.
    pub async fn release_all(&mut self) -> usize {
        release(std::mem::take(&mut self.resources)).await
    }
}

async fn release(resources: Vec<Box<dyn SessionResource>>) -> usize {
    let mut failures = 0;
    for resource in resources {
        match resource.release().await {
            Ok(()) => debug!(resource = %resource.describe(), "Released session resource"),
            Err(e) => {
                failures += 1;
                let e = match e {
                    QuillError::ResourceCleanup(_) => e,
                    other => QuillError::ResourceCleanup(other.to_string()),
                };
                warn!(resource = %resource.describe(), error = %e, "Failed to release session resource");
            }
        }
    }
    failures
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        if self.resources.is_empty() {
            return;
        }
        let resources = std::mem::take(&mut self.resources);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                info!(count = resources.len(), "Session dropped early, releasing resources in background");
                handle.spawn(release(resources));
            }
            Err(_) => {
                let labels: Vec<String> = resources.iter().map(|r| r.describe()).collect();
                warn!(resources = ?labels, "No runtime available, session resources were not released");
            }
        }
    }
}

#[derive(Serialize)]
struct CreateAgentRequest<'a> {
    name: &'a str,
    instructions: &'a str,
    tools: Vec<&'a str>,
}

impl<'a> CreateAgentRequest<'a> {
    fn from_definition(definition: &'a AgentDefinition) -> Self {
        let tools = definition
            .capabilities
            .iter()
            .map(|cap| match cap {
                ToolCapability::WebSearch => WEB_SEARCH_TOOL,
                ToolCapability::ProductSearch => PRODUCT_SEARCH_TOOL,
            })
            .collect();
        Self {
            name: &definition.name,
            instructions: &definition.instructions,
            tools,
        }
    }
}

#[derive(Deserialize)]
struct CreateAgentResponse {
    id: String,
}

/// Registers the researcher with a remote agent service for the lifetime
/// of one session.
///
/// `POST {endpoint}/agents` on allocation, `DELETE {endpoint}/agents/{id}`
/// on release.
///
/// The registration only tracks lifecycle. Invocations still run locally
/// through the model client, so the remote copy is never called. It carries
/// the unrendered instruction template because the brief is not known when
/// the session is allocated.
pub struct RemoteAgentAllocator {
    endpoint: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl RemoteAgentAllocator {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            http_client: reqwest::Client::new(),
        }
    }

    async fn register(&self, definition: &AgentDefinition) -> Result<RemoteAgent> {
        let mut request = self
            .http_client
            .post(format!("{}/agents", self.endpoint))
            .json(&CreateAgentRequest::from_definition(definition));
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| QuillError::UpstreamModel(format!("failed to create remote agent: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuillError::UpstreamModel(format!(
                "failed to create remote agent, status {status}: {body}"
            )));
        }
        let created: CreateAgentResponse = response
            .json()
            .await
            .map_err(|e| QuillError::UpstreamModel(format!("invalid create agent response: {e}")))?;

        info!(agent = %definition.name, remote_id = %created.id, "Created remote agent");

        Ok(RemoteAgent {
            id: created.id,
            agent: definition.name.clone(),
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            http_client: self.http_client.clone(),
        })
    }
}

#[async_trait]
impl ResourceAllocator for RemoteAgentAllocator {
    async fn allocate(&self, roster: &AgentRoster) -> Result<Vec<Box<dyn SessionResource>>> {
        let agent: Box<dyn SessionResource> = Box::new(self.register(&roster.researcher).await?);
        Ok(vec![agent])
    }
}

/// One registration created by [`RemoteAgentAllocator`].
pub struct RemoteAgent {
    id: String,
    agent: String,
    endpoint: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

#[async_trait]
impl SessionResource for RemoteAgent {
    fn describe(&self) -> String {
        format!("remote agent {} ({})", self.id, self.agent)
    }

    async fn release(&self) -> Result<()> {
        let mut request = self
            .http_client
            .delete(format!("{}/agents/{}", self.endpoint, self.id));
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| QuillError::ResourceCleanup(format!("delete {}: {e}", self.id)))?;
        if !response.status().is_success() {
            return Err(QuillError::ResourceCleanup(format!(
                "delete {} returned {}",
                self.id,
                response.status()
            )));
        }
        Ok(())
    }
}

/// Allocator used when no remote resources are configured.
pub struct NoResources;

#[async_trait]
impl ResourceAllocator for NoResources {
    async fn allocate(&self, _roster: &AgentRoster) -> Result<Vec<Box<dyn SessionResource>>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counted {
        released: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl SessionResource for Counted {
        fn describe(&self) -> String {
            "counted".into()
        }
        async fn release(&self) -> Result<()> {
            self.released.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(QuillError::Tool("service gone".into()));
            }
            Ok(())
        }
    }

    fn counted(released: &Arc<AtomicUsize>, fail: bool) -> Box<dyn SessionResource> {
        Box::new(Counted {
            released: released.clone(),
            fail,
        })
    }

    #[tokio::test]
    async fn release_all_runs_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut guard = SessionResources::new(vec![counted(&released, false), counted(&released, false)]);
        assert_eq!(guard.release_all().await, 0);
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert!(guard.is_empty());

        drop(guard);
        tokio::task::yield_now().await;
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_release_is_counted_and_others_still_run() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut guard = SessionResources::new(vec![counted(&released, true), counted(&released, false)]);
        assert_eq!(guard.release_all().await, 1);
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn drop_releases_in_background() {
        let released = Arc::new(AtomicUsize::new(0));
        let guard = SessionResources::new(vec![counted(&released, false)]);
        drop(guard);

        for _ in 0..50 {
            if released.load(Ordering::SeqCst) == 1 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("resource was not released after drop");
    }

    #[tokio::test]
    async fn no_resources_allocates_nothing() {
        let allocated = NoResources.allocate(&AgentRoster::default()).await.unwrap();
        assert!(allocated.is_empty());
    }

    #[test]
    fn remote_agent_describe() {
        let agent = RemoteAgent {
            id: "asst_1".into(),
            agent: "Researcher".into(),
            endpoint: "http://localhost".into(),
            api_key: None,
            http_client: reqwest::Client::new(),
        };
        assert_eq!(agent.describe(), "remote agent asst_1 (Researcher)");
    }

    #[test]
    fn registration_sends_unrendered_template() {
        let roster = AgentRoster::default();
        let body = serde_json::to_value(CreateAgentRequest::from_definition(&roster.researcher)).unwrap();

        assert_eq!(body["name"], roster.researcher.name.as_str());
        assert_eq!(body["instructions"], roster.researcher.instructions.as_str());
        assert!(body["instructions"].as_str().unwrap().contains("{{"));
        assert_eq!(body["tools"], serde_json::json!([WEB_SEARCH_TOOL]));
    }
}
