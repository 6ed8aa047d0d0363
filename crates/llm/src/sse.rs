//! Server-Sent Events line parsing for streamed completions.

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use quill_common::{QuillError, Result};

/// Parse SSE `data:` payloads out of a byte stream.
///
/// Buffers incoming bytes, splits on newlines, skips comments, blank lines
/// and the `[DONE]` marker. A transport error ends the stream with one
/// `UpstreamModel` error.
pub fn parse_sse_lines<S, E>(byte_stream: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send + 'static,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let Ok(line) = std::str::from_utf8(&line_bytes) else {
                        continue;
                    };
                    if let Some(data) = extract_sse_data(line) {
                        return Some((Ok(data), (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        let err = QuillError::UpstreamModel(format!("stream read failed: {e}"));
                        return Some((Err(err), (stream, buffer, true)));
                    }
                    None => {
                        let tail = std::str::from_utf8(&buffer)
                            .ok()
                            .and_then(extract_sse_data);
                        buffer.clear();
                        return tail.map(|data| (Ok(data), (stream, buffer, true)));
                    }
                }
            }
        },
    )
}

fn extract_sse_data(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();

    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_string())
}
