//! Running one agent to completion as a pipeline phase.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use quill_common::{AgentDefinition, Fragment, Message, PhaseContext, Result};
use tracing::debug;

use crate::invoker::{AgentInvoker, EventStream, Invocation, InvocationEvent};

/// Runs single agents and tags their output.
#[derive(Clone)]
pub struct PhaseRunner {
    invoker: Arc<dyn AgentInvoker>,
}

impl PhaseRunner {
    pub fn new(invoker: Arc<dyn AgentInvoker>) -> Self {
        Self { invoker }
    }

    /// Invoke `definition` once against `context`.
    pub fn run(&self, definition: Arc<AgentDefinition>, context: PhaseContext) -> PhaseRun {
        self.run_with_history(definition, context, Vec::new())
    }

    /// Invoke `definition` once, showing it the given loop history.
    pub fn run_with_history(
        &self,
        definition: Arc<AgentDefinition>,
        context: PhaseContext,
        history: Vec<Message>,
    ) -> PhaseRun {
        let agent = definition.name.clone();
        let events = self
            .invoker
            .invoke(Invocation::new(definition, context).with_history(history));
        PhaseRun {
            agent,
            events,
            text: String::new(),
        }
    }
}

/// A phase in progress.
///
/// Yields every fragment the agent produces. Content fragments are tagged
/// with the agent's name and appended to the accumulated text; tool notices
/// are forwarded as they are. Once the stream is exhausted, [`PhaseRun::text`]
/// holds the agent's full output, which may be empty.
pub struct PhaseRun {
    agent: String,
    events: EventStream,
    text: String,
}

impl PhaseRun {
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl Stream for PhaseRun {
    type Item = Result<Fragment>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.events.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(InvocationEvent::Fragment(fragment)))) => {
                    if fragment.is_content() {
                        this.text.push_str(&fragment.content);
                        return Poll::Ready(Some(Ok(fragment.tagged(this.agent.clone()))));
                    }
                    return Poll::Ready(Some(Ok(fragment)));
                }
                Poll::Ready(Some(Ok(InvocationEvent::ToolCall(call)))) => {
                    debug!(agent = %this.agent, tool = %call.tool, arguments = %call.arguments, "Tool call");
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
