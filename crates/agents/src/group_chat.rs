//! Writer/editor turn-taking loop.
//!
//! The loop is a small state machine:
//!
//! ```text
//!  WriterTurn ──► EditorTurn ──► WriterTurn ──► ...
//!                     │
//!                     └── editor accepts ──► Terminated
//! ```
//!
//! After every turn the full message is appended to the loop history and
//! the termination strategy looks at it. A configurable turn cap stops a
//! loop that never converges.

use std::sync::Arc;

use futures::StreamExt;
use quill_common::{AgentDefinition, Fragment, LoopHistory, Message, PhaseContext, Result};
use tracing::{info, warn};

use crate::invoker::FragmentStream;
use crate::phase::PhaseRunner;

pub const DEFAULT_ACCEPTANCE_PHRASE: &str = "Article accepted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    WriterTurn,
    EditorTurn,
    Terminated,
}

impl ChatState {
    /// State after a turn, given whether the termination strategy fired.
    pub fn next(self, terminate: bool) -> ChatState {
        match (self, terminate) {
            (_, true) | (ChatState::Terminated, _) => ChatState::Terminated,
            (ChatState::WriterTurn, false) => ChatState::EditorTurn,
            (ChatState::EditorTurn, false) => ChatState::WriterTurn,
        }
    }
}

/// Decides whether the loop is done after the latest message.
pub trait TerminationStrategy: Send + Sync {
    fn should_terminate(&self, history: &LoopHistory) -> bool;
}

/// Terminates when a given agent's latest message contains a phrase,
/// ignoring case.
#[derive(Debug, Clone)]
pub struct AcceptancePhraseTermination {
    agent: String,
    phrase: String,
}

impl AcceptancePhraseTermination {
    pub fn new(agent: impl Into<String>, phrase: &str) -> Self {
        Self {
            agent: agent.into(),
            phrase: phrase.to_lowercase(),
        }
    }
}

impl TerminationStrategy for AcceptancePhraseTermination {
    fn should_terminate(&self, history: &LoopHistory) -> bool {
        history.latest().is_some_and(|message| {
            message.is_from(&self.agent) && message.content.to_lowercase().contains(&self.phrase)
        })
    }
}

/// Runs the writer and editor in strict alternation, writer first.
#[derive(Clone)]
pub struct GroupChatEngine {
    runner: PhaseRunner,
    writer: Arc<AgentDefinition>,
    editor: Arc<AgentDefinition>,
    termination: Arc<dyn TerminationStrategy>,
    max_turns: Option<usize>,
}

impl GroupChatEngine {
    /// Engine that stops when the editor says "Article accepted".
    pub fn new(runner: PhaseRunner, writer: Arc<AgentDefinition>, editor: Arc<AgentDefinition>) -> Self {
        let termination = Arc::new(AcceptancePhraseTermination::new(
            editor.name.clone(),
            DEFAULT_ACCEPTANCE_PHRASE,
        ));
        Self {
            runner,
            writer,
            editor,
            termination,
            max_turns: None,
        }
    }

    pub fn with_termination(mut self, termination: Arc<dyn TerminationStrategy>) -> Self {
        self.termination = termination;
        self
    }

    /// Stop after this many turns even without acceptance.
    pub fn with_max_turns(mut self, max_turns: Option<usize>) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Run the loop. The writer sees `writer_context` on every turn; the
    /// editor sees only the history.
    pub fn run(&self, writer_context: PhaseContext) -> FragmentStream {
        type Item = Result<Fragment>;
        let engine = self.clone();

        Box::pin(async_stream::stream! {
            let mut history = LoopHistory::new();
            let mut state = ChatState::WriterTurn;
            let mut turn = 0usize;

            loop {
                let (definition, context) = match state {
                    ChatState::WriterTurn => (engine.writer.clone(), writer_context.clone()),
                    ChatState::EditorTurn => (engine.editor.clone(), PhaseContext::new()),
                    ChatState::Terminated => break,
                };

                if engine.max_turns.is_some_and(|max| turn >= max) {
                    warn!(turns = turn, max_turns = ?engine.max_turns, "Group chat reached turn limit without acceptance");
                    break;
                }

                turn += 1;
                info!(agent = %definition.name, turn, phase = "group_chat", "Starting turn");

                let mut run = engine
                    .runner
                    .run_with_history(definition.clone(), context, history.messages().to_vec());
                while let Some(item) = run.next().await {
                    match item {
                        Ok(fragment) => {
                            let v: Item = Ok(fragment);
                            yield v;
                        }
                        Err(e) => {
                            let v: Item = Err(e);
                            yield v;
                            return;
                        }
                    }
                }

                history.push(Message::new(definition.name.clone(), run.into_text()));
                let terminate = engine.termination.should_terminate(&history);
                state = state.next(terminate);
            }

            info!(turns = turn, accepted = state == ChatState::Terminated, "Group chat finished");
        })
    }
}
