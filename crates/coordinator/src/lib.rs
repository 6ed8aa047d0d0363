//! Session orchestration for the creative writer.
//!
//! A [`WriterApp`] is built once from configuration and creates one
//! [`SessionOrchestrator`] per request. A session runs three phases in
//! order and streams every fragment as it is produced:
//!
//! ```text
//! WritingBrief
//!      │
//!      ▼
//! ┌────────────┐   research_results
//! │ Researcher │ ────────────────────┐
//! └────────────┘                     │
//! ┌────────────┐   product_results   ▼
//! │ Marketing  │ ──────────────► ┌─────────────────┐
//! └────────────┘                 │ Writer ⇄ Editor │ ──► until accepted
//!                                └─────────────────┘
//! ```
//!
//! Per-session resources are released when the stream ends, fails or is
//! dropped.

pub mod app;
pub mod config;
pub mod resources;
pub mod session;

pub use app::WriterApp;
pub use config::{AgentOverride, OrchestrationConfig, QuillConfig, ResourcesConfig};
pub use resources::{
    NoResources, RemoteAgent, RemoteAgentAllocator, ResourceAllocator, SessionResource,
    SessionResources,
};
pub use session::SessionOrchestrator;
