//! HTTP route handlers for the API.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json,
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use quill_common::{Fragment, QuillError, WritingBrief};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::AppState;
use crate::contracts::{ChatDelta, ChatRequest};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

type LineStream = BoxStream<'static, Result<Bytes, Infallible>>;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Stream one creative-writer session as NDJSON.
///
/// The brief is the YAML in the last message. A brief that cannot be
/// decoded produces a single system line and no session is created.
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    info!(messages = request.messages.len(), "Received chat stream request");

    let brief = request
        .last_content()
        .ok_or_else(|| QuillError::Decode("request contains no messages".into()))
        .and_then(WritingBrief::from_yaml);

    let lines: LineStream = match brief {
        Ok(brief) => session_lines(state, brief),
        Err(e) => {
            warn!(error = %e, "Rejected writing brief");
            let line = encode(decode_error_fragment(e));
            stream::iter(line.map(Ok)).boxed()
        }
    };

    ([(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)], Body::from_stream(lines)).into_response()
}

fn decode_error_fragment(e: QuillError) -> Fragment {
    let details = match e {
        QuillError::Decode(details) => details,
        other => other.to_string(),
    };
    Fragment::system(format!("Error: Invalid YAML format, Details:  \n{details}"))
}

fn error_fragment(e: &QuillError) -> Fragment {
    Fragment::system(format!("Error: {e}"))
}

fn encode(fragment: Fragment) -> Option<Bytes> {
    match ChatDelta::from(fragment).to_line() {
        Ok(line) => Some(Bytes::from(line)),
        Err(e) => {
            error!(error = %e, "Failed to encode fragment");
            None
        }
    }
}

fn session_lines(state: Arc<AppState>, brief: WritingBrief) -> LineStream {
    type Item = Result<Bytes, Infallible>;

    Box::pin(async_stream::stream! {
        let session = match state.app.create_session().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Failed to create session");
                if let Some(line) = encode(error_fragment(&e)) {
                    let v: Item = Ok(line);
                    yield v;
                }
                return;
            }
        };

        let session_id = session.id();
        let deadline = state
            .session_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);
        let mut fragments = session.process_streaming_request(brief);

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, fragments.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(session_id, "Session deadline reached");
                        if let Some(line) = encode(Fragment::system("Error: session timed out")) {
                            let v: Item = Ok(line);
                            yield v;
                        }
                        break;
                    }
                },
                None => fragments.next().await,
            };

            let fragment = match next {
                Some(Ok(fragment)) => fragment,
                Some(Err(e)) => {
                    let fragment = error_fragment(&e);
                    if let Some(line) = encode(fragment) {
                        let v: Item = Ok(line);
                        yield v;
                    }
                    break;
                }
                None => break,
            };
            if let Some(line) = encode(fragment) {
                let v: Item = Ok(line);
                yield v;
            }
        }
    })
}
