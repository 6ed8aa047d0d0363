//! HTTP API for the Quill creative writer.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /chat/stream` - Run one session and stream its fragments as NDJSON
//!
//! # Architecture
//!
//! ```text
//! Client
//!    │  POST /chat/stream  {messages: [..., {content: <YAML brief>}]}
//!    ▼
//! ┌─────────────────┐
//! │   API (Axum)    │ ◄── This crate: decode brief, encode NDJSON
//! └────────┬────────┘
//!          │ WriterApp::create_session
//!          ▼
//! ┌─────────────────┐
//! │ SessionOrchest. │ ──► Researcher → Marketing → Writer ⇄ Editor
//! └─────────────────┘
//! ```

pub mod contracts;
pub mod routes;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use contracts::{ChatDelta, ChatRequest, ChatRequestMessage, DeltaBody, DeltaContext};
pub use state::AppState;

/// Create the API router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/chat/stream", post(routes::chat_stream))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server on the given address.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let router = create_router(state);

    info!(%addr, "Starting Quill API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
