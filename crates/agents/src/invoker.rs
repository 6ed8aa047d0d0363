//! Invoking one agent against the model, including its tool-call rounds.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use quill_common::{AgentDefinition, Fragment, Message, PhaseContext, QuillError, Result};
use quill_llm::{ChatMessage, LlmClient, LlmRequest, StreamChunk, ToolChoice};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::tools::{ToolRegistry, tool_spec};

/// Text sent as the user turn when an agent has no history to respond to.
const KICKOFF_MESSAGE: &str = "Begin.";

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// A tool call the model asked for, announced before it runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool: String,
    pub arguments: Value,
}

/// Everything an invoker produces while an agent runs.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationEvent {
    /// Output for the caller.
    Fragment(Fragment),
    /// The agent is about to call a tool.
    ToolCall(ToolInvocation),
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<InvocationEvent>> + Send>>;
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment>> + Send>>;

/// One call of one agent.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub definition: Arc<AgentDefinition>,
    pub context: PhaseContext,
    /// Loop history visible to the agent. Empty outside the group chat.
    pub history: Vec<Message>,
}

impl Invocation {
    pub fn new(definition: Arc<AgentDefinition>, context: PhaseContext) -> Self {
        Self {
            definition,
            context,
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}

/// Runs an agent and relays what it produces.
///
/// The returned stream is lazy. Nothing is sent to the model until it is
/// first polled, and it cannot be restarted once consumed.
pub trait AgentInvoker: Send + Sync {
    fn invoke(&self, invocation: Invocation) -> EventStream;
}

impl<T: AgentInvoker + ?Sized> AgentInvoker for Arc<T> {
    fn invoke(&self, invocation: Invocation) -> EventStream {
        (**self).invoke(invocation)
    }
}

/// Invoker backed by a streaming model client and the shared tool registry.
#[derive(Clone)]
pub struct ModelInvoker {
    client: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    max_tool_rounds: usize,
}

impl ModelInvoker {
    pub fn new(client: Arc<dyn LlmClient>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            client,
            tools,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }
}

/// Map loop history to chat messages from `agent`'s point of view.
fn history_messages(agent: &str, history: &[Message]) -> Vec<ChatMessage> {
    if history.is_empty() {
        return vec![ChatMessage::user(KICKOFF_MESSAGE)];
    }
    history
        .iter()
        .map(|message| {
            if message.is_from(agent) {
                ChatMessage::assistant(message.content.clone())
            } else {
                ChatMessage::user(message.content.clone()).with_name(message.author.clone())
            }
        })
        .collect()
}

fn upstream(error: QuillError) -> QuillError {
    match error {
        QuillError::UpstreamModel(_) => error,
        other => QuillError::UpstreamModel(other.to_string()),
    }
}

impl AgentInvoker for ModelInvoker {
    fn invoke(&self, invocation: Invocation) -> EventStream {
        type Item = Result<InvocationEvent>;

        let client = self.client.clone();
        let registry = self.tools.clone();
        let max_tool_rounds = self.max_tool_rounds;

        Box::pin(async_stream::stream! {
            let Invocation { definition, context, history } = invocation;
            let agent = definition.name.clone();

            let instructions = match definition.render_instructions(&context) {
                Ok(text) => text,
                Err(e) => {
                    let v: Item = Err(e);
                    yield v;
                    return;
                }
            };

            let tools = registry.tools_for(&definition);
            let specs: Vec<_> = tools.iter().map(|t| tool_spec(t.as_ref())).collect();
            let mut messages = history_messages(&agent, &history);
            let mut round = 0usize;

            info!(agent = %agent, tools = specs.len(), history = history.len(), "Invoking agent");

            loop {
                let tool_choice = match (specs.is_empty(), round == 0 && definition.require_tool_use) {
                    (true, _) => None,
                    (false, true) => Some(ToolChoice::Required),
                    (false, false) => Some(ToolChoice::Auto),
                };
                let request = LlmRequest {
                    system_prompt: Some(instructions.clone()),
                    messages: messages.clone(),
                    temperature: definition.temperature,
                    max_tokens: definition.max_tokens,
                    tools: specs.clone(),
                    tool_choice,
                };

                let mut chunks = match client.stream(request).await {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        warn!(agent = %agent, error = %e, "Model call failed");
                        let v: Item = Err(upstream(e));
                        yield v;
                        return;
                    }
                };

                let mut text = String::new();
                let mut calls = Vec::new();
                let mut finished = false;

                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(StreamChunk::Text(piece)) => {
                            text.push_str(&piece);
                            let v: Item = Ok(InvocationEvent::Fragment(Fragment::content(piece)));
                            yield v;
                        }
                        Ok(StreamChunk::ToolCall(call)) => calls.push(call),
                        Ok(StreamChunk::Done { finish_reason }) => {
                            debug!(agent = %agent, round, ?finish_reason, "Model round finished");
                            finished = true;
                            break;
                        }
                        Err(e) => {
                            warn!(agent = %agent, error = %e, "Model stream failed");
                            let v: Item = Err(upstream(e));
                            yield v;
                            return;
                        }
                    }
                }

                if !finished {
                    let v: Item = Err(QuillError::UpstreamModel(format!(
                        "model stream for {agent} ended before completion"
                    )));
                    yield v;
                    return;
                }

                if calls.is_empty() {
                    return;
                }

                round += 1;
                if round > max_tool_rounds {
                    let v: Item = Err(QuillError::UpstreamModel(format!(
                        "{agent} exceeded {max_tool_rounds} tool rounds"
                    )));
                    yield v;
                    return;
                }

                messages.push(ChatMessage::assistant_tool_calls(text, calls.clone()));

                for call in calls {
                    let arguments: Value = if call.arguments.trim().is_empty() {
                        Value::Object(Default::default())
                    } else {
                        match serde_json::from_str(&call.arguments) {
                            Ok(arguments) => arguments,
                            Err(e) => {
                                let v: Item = Err(QuillError::UpstreamModel(format!(
                                    "invalid arguments for tool {}: {e}", call.name
                                )));
                                yield v;
                                return;
                            }
                        }
                    };

                    let Some(tool) = tools.iter().find(|t| t.name() == call.name) else {
                        let v: Item = Err(QuillError::UpstreamModel(format!(
                            "{agent} called unknown tool {}", call.name
                        )));
                        yield v;
                        return;
                    };

                    let v: Item = Ok(InvocationEvent::ToolCall(ToolInvocation {
                        tool: call.name.clone(),
                        arguments: arguments.clone(),
                    }));
                    yield v;

                    let output = match tool.call(arguments).await {
                        Ok(output) => output,
                        Err(e) => {
                            warn!(agent = %agent, tool = %call.name, error = %e, "Tool call failed");
                            let v: Item = Err(QuillError::UpstreamModel(format!(
                                "tool {} failed: {e}", call.name
                            )));
                            yield v;
                            return;
                        }
                    };
                    debug!(agent = %agent, tool = %call.name, bytes = output.len(), "Tool call finished");
                    messages.push(ChatMessage::tool_result(call.id, output));
                }
            }
        })
    }
}
