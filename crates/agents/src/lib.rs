//! Agent execution for the creative-writer pipeline.
//!
//! - [`invoker`]: sends one agent's rendered instructions to the model and
//!   runs the tool calls it asks for
//! - [`recorder`]: turns tool calls into notice fragments for the caller
//! - [`phase`]: runs one agent to completion and accumulates its text
//! - [`group_chat`]: alternates writer and editor until the editor accepts
//!
//! ```text
//!  PhaseRunner ──► ToolInvocationRecorder ──► ModelInvoker ──► LlmClient
//!       ▲                                          │
//!       │                                          └──► ToolRegistry
//!  GroupChatEngine
//! ```

pub mod group_chat;
pub mod invoker;
pub mod phase;
pub mod recorder;
pub mod roster;
pub mod tools;

pub use group_chat::{
    AcceptancePhraseTermination, ChatState, DEFAULT_ACCEPTANCE_PHRASE, GroupChatEngine,
    TerminationStrategy,
};
pub use invoker::{
    AgentInvoker, DEFAULT_MAX_TOOL_ROUNDS, EventStream, FragmentStream, Invocation,
    InvocationEvent, ModelInvoker, ToolInvocation,
};
pub use phase::{PhaseRun, PhaseRunner};
pub use recorder::ToolInvocationRecorder;
pub use roster::{AgentRoster, EDITOR_NAME, MARKETING_NAME, RESEARCHER_NAME, WRITER_NAME};
pub use tools::{ToolRegistry, tool_spec};
