//! Common types and traits shared across quill crates.
//!
//! This crate provides the foundational abstractions the agent pipeline
//! uses to pass work between phases and to report progress to callers.

pub mod brief;
pub mod context;
pub mod error;
pub mod message;
pub mod traits;

pub use brief::WritingBrief;
pub use context::PhaseContext;
pub use error::{QuillError, Result};
pub use message::{ChatRole, Fragment, LoopHistory, Message};
pub use traits::{AgentDefinition, Tool, ToolCapability};
