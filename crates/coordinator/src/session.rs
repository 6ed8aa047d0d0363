//! One creative-writer run: research, marketing, then the writer/editor loop.

use std::sync::Arc;

use futures::StreamExt;
use quill_agents::{
    AcceptancePhraseTermination, AgentRoster, FragmentStream, GroupChatEngine, PhaseRunner,
};
use quill_common::{Fragment, PhaseContext, Result, WritingBrief};
use tracing::{error, info};

use crate::config::OrchestrationConfig;
use crate::resources::SessionResources;

/// A single session, consumed by [`SessionOrchestrator::process_streaming_request`].
pub struct SessionOrchestrator {
    id: u64,
    roster: AgentRoster,
    runner: PhaseRunner,
    orchestration: OrchestrationConfig,
    resources: SessionResources,
}

impl SessionOrchestrator {
    pub fn new(
        id: u64,
        roster: AgentRoster,
        runner: PhaseRunner,
        orchestration: OrchestrationConfig,
        resources: SessionResources,
    ) -> Self {
        Self {
            id,
            roster,
            runner,
            orchestration,
            resources,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run the whole pipeline for `brief`, yielding fragments as they are
    /// produced.
    ///
    /// The stream ends after the editor accepts the article, after the
    /// first error, or when the turn cap is reached. Session resources are
    /// released on every one of those paths, and also when the stream is
    /// dropped before it finishes.
    pub fn process_streaming_request(self, brief: WritingBrief) -> FragmentStream {
        type Item = Result<Fragment>;

        let SessionOrchestrator {
            id,
            roster,
            runner,
            orchestration,
            mut resources,
        } = self;
        Box::pin(async_stream::stream! {
            info!(session_id = id, "Session started");
            let mut pipeline = run_pipeline(roster, runner, orchestration, brief);
            let mut failed = false;

            while let Some(item) = pipeline.next().await {
                if let Err(ref e) = item {
                    error!(session_id = id, error = %e, "Session failed");
                    failed = true;
                }
                let v: Item = item;
                yield v;
                if failed {
                    break;
                }
            }

            drop(pipeline);
            // Runs to completion even if this stream is dropped while waiting.
            let release = tokio::spawn(async move { resources.release_all().await });
            match release.await {
                Ok(release_failures) => {
                    info!(session_id = id, failed, release_failures, "Session finished");
                }
                Err(e) => error!(session_id = id, error = %e, "Session resource release task failed"),
            }
        })
    }
}

fn run_pipeline(
    roster: AgentRoster,
    runner: PhaseRunner,
    orchestration: OrchestrationConfig,
    brief: WritingBrief,
) -> FragmentStream {
    type Item = Result<Fragment>;

    Box::pin(async_stream::stream! {
        let WritingBrief { research, products, assignment } = brief;

        // Research
        let context = match PhaseContext::new().with("research_context", research.clone()) {
            Ok(context) => context,
            Err(e) => {
                let v: Item = Err(e);
                yield v;
                return;
            }
        };
        info!(phase = "research", agent = %roster.researcher.name, "Starting phase");
        let mut phase = runner.run(roster.researcher.clone(), context);
        while let Some(item) = phase.next().await {
            let failed = item.is_err();
            let v: Item = item;
            yield v;
            if failed {
                return;
            }
        }
        let research_results = phase.into_text();

        // Marketing
        let context = match PhaseContext::new().with("product_context", products.clone()) {
            Ok(context) => context,
            Err(e) => {
                let v: Item = Err(e);
                yield v;
                return;
            }
        };
        info!(phase = "marketing", agent = %roster.marketer.name, "Starting phase");
        let mut phase = runner.run(roster.marketer.clone(), context);
        while let Some(item) = phase.next().await {
            let failed = item.is_err();
            let v: Item = item;
            yield v;
            if failed {
                return;
            }
        }
        let product_results = phase.into_text();

        // Writer/editor loop
        let loop_context = match PhaseContext::try_from(vec![
            ("research_context", research),
            ("research_results", research_results),
            ("product_context", products),
            ("product_results", product_results),
            ("assignment", assignment),
        ]) {
            Ok(context) => context,
            Err(e) => {
                let v: Item = Err(e);
                yield v;
                return;
            }
        };

        let termination = Arc::new(AcceptancePhraseTermination::new(
            roster.editor.name.clone(),
            &orchestration.acceptance_phrase,
        ));
        let engine = GroupChatEngine::new(runner, roster.writer.clone(), roster.editor.clone())
            .with_termination(termination)
            .with_max_turns(orchestration.max_turns);

        info!(phase = "group_chat", max_turns = ?orchestration.max_turns, "Starting phase");
        let mut chat = engine.run(loop_context);
        while let Some(item) = chat.next().await {
            let failed = item.is_err();
            let v: Item = item;
            yield v;
            if failed {
                return;
            }
        }
    })
}
