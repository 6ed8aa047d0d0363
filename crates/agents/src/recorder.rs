//! Surfaces an agent's tool calls to the caller as notice fragments.

use futures::StreamExt;
use quill_common::Fragment;
use tracing::info;

use crate::invoker::{AgentInvoker, EventStream, Invocation, InvocationEvent};

/// Wraps an invoker and turns each tool call into a system notice
/// `"<tool>: <json args>"`.
///
/// The notice is produced when the call is announced, which is before the
/// tool runs and before any output that depends on its result.
pub struct ToolInvocationRecorder<I> {
    inner: I,
}

impl<I: AgentInvoker> ToolInvocationRecorder<I> {
    pub fn new(inner: I) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> I {
        self.inner
    }
}

impl<I: AgentInvoker> AgentInvoker for ToolInvocationRecorder<I> {
    fn invoke(&self, invocation: Invocation) -> EventStream {
        let agent = invocation.definition.name.clone();
        Box::pin(self.inner.invoke(invocation).map(move |event| {
            event.map(|event| match event {
                InvocationEvent::ToolCall(call) => {
                    info!(agent = %agent, tool = %call.tool, "Recording tool call");
                    InvocationEvent::Fragment(Fragment::tool_notice(&call.tool, &call.arguments))
                }
                other => other,
            })
        }))
    }
}
