//! End-to-end session tests: research, marketing and the writer/editor
//! loop against a scripted model client.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use quill_agents::{AgentRoster, ToolRegistry};
use quill_common::{
    ChatRole, Fragment, QuillError, Result, Tool, ToolCapability, WritingBrief,
};
use quill_coordinator::{
    OrchestrationConfig, ResourceAllocator, SessionResource, WriterApp,
};
use quill_llm::{LlmRequest, MockClient, MockResponse, Role};
use serde_json::{Value, json};

struct StaticTool {
    name: &'static str,
    capability: ToolCapability,
    output: &'static str,
}

#[async_trait]
impl Tool for StaticTool {
    fn capability(&self) -> ToolCapability {
        self.capability
    }
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "test tool"
    }
    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }
    async fn call(&self, _arguments: Value) -> Result<String> {
        Ok(self.output.to_string())
    }
}

fn tools() -> ToolRegistry {
    ToolRegistry::new()
        .with_tool(Arc::new(StaticTool {
            name: "web_search",
            capability: ToolCapability::WebSearch,
            output: "1. Cold brew (https://a.example)\nSales up.",
        }))
        .with_tool(Arc::new(StaticTool {
            name: "product_search",
            capability: ToolCapability::ProductSearch,
            output: "Guji Reserve: washed Ethiopian beans",
        }))
}

fn prompt_of(request: &LlmRequest) -> &str {
    request.system_prompt.as_deref().unwrap_or_default()
}

fn after_tool_result(request: &LlmRequest) -> bool {
    request
        .messages
        .last()
        .is_some_and(|message| message.role == Role::Tool)
}

/// Researcher and marketer search once then answer; the editor accepts
/// after `rejections` rounds of feedback.
fn coffee_client(rejections: usize) -> Arc<MockClient> {
    let editor_turns = AtomicUsize::new(0);
    Arc::new(MockClient::with_responder(move |request| {
        let prompt = prompt_of(request);
        if prompt.starts_with("You are a researcher") {
            if after_tool_result(request) {
                MockResponse::text("Cold brew sales are rising.")
            } else {
                MockResponse::tool_call("call_r", "web_search", json!({"query": "coffee trends 2024"}))
            }
        } else if prompt.starts_with("You are a marketing specialist") {
            if after_tool_result(request) {
                MockResponse::text("Guji Reserve suits cold brew.")
            } else {
                MockResponse::tool_call("call_m", "product_search", json!({"query": "single-origin beans"}))
            }
        } else if prompt.starts_with("You are the editor") {
            if editor_turns.fetch_add(1, Ordering::SeqCst) < rejections {
                MockResponse::text("Mention the roast date.")
            } else {
                MockResponse::text("Article accepted, no further rework necessary.")
            }
        } else {
            MockResponse::text("Cold brew season is here.")
        }
    }))
}

fn brief() -> WritingBrief {
    WritingBrief::new(
        "coffee trends 2024",
        "single-origin beans",
        "write a 100-word teaser",
    )
}

fn app(client: Arc<MockClient>) -> WriterApp {
    WriterApp::new(AgentRoster::default(), client, tools())
}

async fn run(app: &WriterApp) -> Vec<Result<Fragment>> {
    app.create_session()
        .await
        .unwrap()
        .process_streaming_request(brief())
        .collect()
        .await
}

fn content_authors(fragments: &[Fragment]) -> Vec<&str> {
    fragments
        .iter()
        .filter(|f| f.is_content())
        .filter_map(|f| f.author_name.as_deref())
        .collect()
}

#[derive(Clone, Default)]
struct CountingAllocator {
    allocated: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

struct CountedResource {
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl SessionResource for CountedResource {
    fn describe(&self) -> String {
        "counted".into()
    }
    async fn release(&self) -> Result<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ResourceAllocator for CountingAllocator {
    async fn allocate(&self, _roster: &AgentRoster) -> Result<Vec<Box<dyn SessionResource>>> {
        self.allocated.fetch_add(1, Ordering::SeqCst);
        let resource: Box<dyn SessionResource> = Box::new(CountedResource {
            released: self.released.clone(),
        });
        Ok(vec![resource])
    }
}

/// Hands out one resource whose release takes a while.
#[derive(Clone, Default)]
struct SlowAllocator {
    released: Arc<AtomicUsize>,
}

struct SlowResource {
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl SessionResource for SlowResource {
    fn describe(&self) -> String {
        "slow".into()
    }
    async fn release(&self) -> Result<()> {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ResourceAllocator for SlowAllocator {
    async fn allocate(&self, _roster: &AgentRoster) -> Result<Vec<Box<dyn SessionResource>>> {
        let resource: Box<dyn SessionResource> = Box::new(SlowResource {
            released: self.released.clone(),
        });
        Ok(vec![resource])
    }
}

struct FailingAllocator;

#[async_trait]
impl ResourceAllocator for FailingAllocator {
    async fn allocate(&self, _roster: &AgentRoster) -> Result<Vec<Box<dyn SessionResource>>> {
        Err(QuillError::Config("agent service unavailable".into()))
    }
}

async fn wait_for(counter: &AtomicUsize, expected: usize) {
    for _ in 0..100 {
        if counter.load(Ordering::SeqCst) == expected {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!(
        "counter stayed at {}, expected {expected}",
        counter.load(Ordering::SeqCst)
    );
}

// ============================================================================
// Pipeline
// ============================================================================

#[tokio::test]
async fn coffee_brief_yields_one_fragment_per_agent() {
    let client = coffee_client(0);
    let fragments: Vec<Fragment> = run(&app(client.clone()))
        .await
        .into_iter()
        .map(|f| f.unwrap())
        .collect();

    let content: Vec<&Fragment> = fragments.iter().filter(|f| f.is_content()).collect();
    assert_eq!(content.len(), 4);
    assert_eq!(
        content_authors(&fragments),
        vec!["Researcher", "Marketing", "Writer", "Editor"]
    );
    assert_eq!(content[0].content, "Cold brew sales are rising.");
    assert_eq!(content[3].content, "Article accepted, no further rework necessary.");
    assert!(content.iter().all(|f| f.role == ChatRole::Assistant));

    // two searches, two answers, one draft, one verdict
    assert_eq!(client.call_count(), 6);
}

#[tokio::test]
async fn tool_notices_precede_the_content_they_feed() {
    let fragments: Vec<Fragment> = run(&app(coffee_client(0)))
        .await
        .into_iter()
        .map(|f| f.unwrap())
        .collect();

    let notices: Vec<usize> = fragments
        .iter()
        .enumerate()
        .filter(|(_, f)| f.is_tool_notice)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(notices.len(), 2);

    let first_research = fragments
        .iter()
        .position(|f| f.is_content() && f.author_name.as_deref() == Some("Researcher"))
        .unwrap();
    let first_marketing = fragments
        .iter()
        .position(|f| f.is_content() && f.author_name.as_deref() == Some("Marketing"))
        .unwrap();
    assert!(notices[0] < first_research);
    assert!(first_research < notices[1]);
    assert!(notices[1] < first_marketing);

    let notice = &fragments[notices[0]];
    assert_eq!(notice.role, ChatRole::System);
    assert!(notice.author_name.is_none());
    assert!(notice.content.starts_with("web_search"));
    assert!(notice.content.contains("coffee trends 2024"));
}

#[tokio::test]
async fn writer_receives_phase_results() {
    let client = coffee_client(0);
    run(&app(client.clone())).await;

    let writer_request = client
        .requests()
        .into_iter()
        .find(|r| prompt_of(r).starts_with("You are a writer"))
        .unwrap();
    let prompt = prompt_of(&writer_request);
    assert!(prompt.contains("Cold brew sales are rising."));
    assert!(prompt.contains("Guji Reserve suits cold brew."));
    assert!(prompt.contains("write a 100-word teaser"));
    assert!(prompt.contains("single-origin beans"));
}

#[tokio::test]
async fn rework_rounds_alternate_writer_and_editor() {
    let fragments: Vec<Fragment> = run(&app(coffee_client(2)))
        .await
        .into_iter()
        .map(|f| f.unwrap())
        .collect();

    assert_eq!(
        content_authors(&fragments),
        vec![
            "Researcher", "Marketing", "Writer", "Editor", "Writer", "Editor", "Writer", "Editor"
        ]
    );
}

#[tokio::test]
async fn identical_runs_stream_identical_fragments() {
    let first = run(&app(coffee_client(1))).await;
    let second = run(&app(coffee_client(1))).await;

    let encode = |items: Vec<Result<Fragment>>| -> Vec<String> {
        items
            .into_iter()
            .map(|f| serde_json::to_string(&f.unwrap()).unwrap())
            .collect()
    };
    assert_eq!(encode(first), encode(second));
}

#[tokio::test]
async fn turn_cap_ends_a_session_that_never_converges() {
    let client = coffee_client(usize::MAX);
    let app = app(client).with_orchestration(OrchestrationConfig {
        max_turns: Some(4),
        ..OrchestrationConfig::default()
    });

    let fragments: Vec<Fragment> = run(&app).await.into_iter().map(|f| f.unwrap()).collect();
    let loop_turns = content_authors(&fragments)
        .into_iter()
        .filter(|a| *a == "Writer" || *a == "Editor")
        .count();
    assert_eq!(loop_turns, 4);
}

#[tokio::test]
async fn model_failure_ends_the_session() {
    let client = Arc::new(MockClient::with_responder(|request| {
        if prompt_of(request).starts_with("You are a marketing specialist") {
            MockResponse::Error("rate limited".into())
        } else if after_tool_result(request) {
            MockResponse::text("Cold brew sales are rising.")
        } else {
            MockResponse::tool_call("call_r", "web_search", json!({"query": "coffee"}))
        }
    }));

    let items = run(&app(client.clone())).await;
    let (last, rest) = items.split_last().unwrap();
    assert!(matches!(last, Err(QuillError::UpstreamModel(_))));
    assert!(rest.iter().all(|f| f.is_ok()));
    assert!(
        rest.iter()
            .filter_map(|f| f.as_ref().ok())
            .all(|f| f.author_name.as_deref() != Some("Writer"))
    );
    assert!(
        client
            .requests()
            .iter()
            .all(|r| !prompt_of(r).starts_with("You are a writer"))
    );
}

// ============================================================================
// Resources
// ============================================================================

#[tokio::test]
async fn resources_released_after_completion() {
    let allocator = CountingAllocator::default();
    let app = app(coffee_client(0)).with_allocator(Arc::new(allocator.clone()));

    run(&app).await;
    assert_eq!(allocator.allocated.load(Ordering::SeqCst), 1);
    assert_eq!(allocator.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn resources_released_after_failure() {
    let allocator = CountingAllocator::default();
    let client = Arc::new(MockClient::new(vec![MockResponse::Error("boom".into())]));
    let app = app(client).with_allocator(Arc::new(allocator.clone()));

    let items = run(&app).await;
    assert!(items.last().unwrap().is_err());
    assert_eq!(allocator.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn resources_released_when_stream_is_dropped() {
    let allocator = CountingAllocator::default();
    let app = app(coffee_client(0)).with_allocator(Arc::new(allocator.clone()));

    let mut stream = app
        .create_session()
        .await
        .unwrap()
        .process_streaming_request(brief());
    let first = stream.next().await.unwrap().unwrap();
    assert!(first.is_tool_notice);
    drop(stream);

    wait_for(&allocator.released, 1).await;
}

#[tokio::test]
async fn release_survives_stream_dropped_mid_release() {
    let allocator = SlowAllocator::default();
    let app = app(coffee_client(0)).with_allocator(Arc::new(allocator.clone()));

    let mut stream = app
        .create_session()
        .await
        .unwrap()
        .process_streaming_request(brief());

    // Drain every fragment; the poll after the last one starts the release.
    let mut fragments = 0;
    loop {
        match tokio::time::timeout(std::time::Duration::from_millis(20), stream.next()).await {
            Ok(Some(item)) => {
                item.unwrap();
                fragments += 1;
            }
            Ok(None) => panic!("release finished before the stream was dropped"),
            Err(_) => break,
        }
    }
    assert_eq!(fragments, 6);
    assert_eq!(allocator.released.load(Ordering::SeqCst), 0);

    drop(stream);
    wait_for(&allocator.released, 1).await;
}

#[tokio::test]
async fn each_session_gets_its_own_resources() {
    let allocator = CountingAllocator::default();
    let app = app(coffee_client(0)).with_allocator(Arc::new(allocator.clone()));

    let a = app.create_session().await.unwrap();
    let b = app.create_session().await.unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(allocator.allocated.load(Ordering::SeqCst), 2);

    a.process_streaming_request(brief()).collect::<Vec<_>>().await;
    b.process_streaming_request(brief()).collect::<Vec<_>>().await;
    assert_eq!(allocator.released.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn allocation_failure_is_an_upstream_error() {
    let app = app(coffee_client(0)).with_allocator(Arc::new(FailingAllocator));
    let err = app.create_session().await.err().unwrap();
    assert!(matches!(err, QuillError::UpstreamModel(_)));
}
