//! Server-Sent Events (SSE) processing for streaming completions.
//!
//! This module turns the raw byte stream of a completion response into a
//! lazy stream of [`ChatCompletionChunk`] values, in the order the server sent
//! them.  The stream is finite and cannot be restarted.
//!
//! Framing rules:
//!
//! - events are separated by a blank line; `\r\n` line endings are accepted
//! - lines starting with `:` are comments
//! - several `data:` lines in one event are joined with `\n`
//! - `data: [DONE]` ends the stream
//!
//! A stream that stops before `[DONE]` and before any chunk carrying a finish
//! reason yields a single [`Error::Streaming`] and then ends.

use std::error;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;

use crate::observability::{STREAM_BYTES, STREAM_CHUNKS, STREAM_ERRORS};
use crate::{ChatCompletionChunk, Error, Result};

/// End-of-stream sentinel sent by the server.
const DONE_MARKER: &str = "[DONE]";

/// Process a stream of bytes into a stream of completion chunks.
///
/// The byte stream is buffered so that events and multi-byte characters
/// split across network reads decode correctly.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + 'static,
    E: error::Error + Send + Sync + 'static,
{
    let state = DecoderState {
        stream: Box::pin(byte_stream),
        buffer: Vec::new(),
        scanned: 0,
        finished: false,
        eof: false,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }

            // First check if we have a complete event in the buffer
            if let Some(frame) = take_frame(&mut state.buffer, &mut state.scanned) {
                match parse_frame(&frame) {
                    Frame::Skip => continue,
                    Frame::Done => {
                        state.done = true;
                        return None;
                    }
                    Frame::Chunk(Ok(chunk)) => {
                        STREAM_CHUNKS.click();
                        if chunk.is_finished() {
                            state.finished = true;
                        }
                        return Some((Ok(chunk), state));
                    }
                    Frame::Chunk(Err(err)) => {
                        STREAM_ERRORS.click();
                        return Some((Err(err), state));
                    }
                }
            }

            if state.eof {
                state.done = true;
                if state.finished {
                    return None;
                }
                STREAM_ERRORS.click();
                return Some((
                    Err(Error::streaming(
                        "stream ended before the completion finished",
                        None,
                    )),
                    state,
                ));
            }

            // Read more data
            match state.stream.next().await {
                Some(Ok(bytes)) => {
                    STREAM_BYTES.count(bytes.len() as u64);
                    state
                        .buffer
                        .extend(bytes.iter().copied().filter(|b| *b != b'\r'));
                }
                Some(Err(e)) => {
                    STREAM_ERRORS.click();
                    state.done = true;
                    return Some((
                        Err(Error::streaming(
                            format!("connection dropped mid-stream: {e}"),
                            Some(Box::new(e)),
                        )),
                        state,
                    ));
                }
                None => {
                    // Flush an unterminated trailing event.
                    state.eof = true;
                    if !state.buffer.iter().all(u8::is_ascii_whitespace) {
                        state.buffer.extend_from_slice(b"\n\n");
                    }
                }
            }
        }
    })
}

/// Drain a chunk stream and concatenate the delta content of every chunk.
pub async fn collect_content<S>(stream: S) -> Result<String>
where
    S: Stream<Item = Result<ChatCompletionChunk>>,
{
    futures::pin_mut!(stream);
    let mut content = String::new();
    while let Some(chunk) = stream.next().await {
        if let Some(text) = chunk?.content() {
            content.push_str(text);
        }
    }
    Ok(content)
}

struct DecoderState<S> {
    stream: S,
    buffer: Vec<u8>,
    /// Bytes of `buffer` already searched for a frame boundary.
    scanned: usize,
    finished: bool,
    eof: bool,
    done: bool,
}

enum Frame {
    Skip,
    Done,
    Chunk(Result<ChatCompletionChunk>),
}

/// Remove and return the first complete event from the buffer.
///
/// `scanned` carries the search position across calls so bytes are not
/// searched again after every read.
fn take_frame(buffer: &mut Vec<u8>, scanned: &mut usize) -> Option<Vec<u8>> {
    // Back up one byte: the first `\n` of the boundary may end the old data.
    let start = scanned.saturating_sub(1);
    let Some(offset) = buffer[start..].windows(2).position(|w| w == b"\n\n") else {
        *scanned = buffer.len();
        return None;
    };
    let end = start + offset;
    let frame = buffer[..end].to_vec();
    buffer.drain(..end + 2);
    *scanned = 0;
    Some(frame)
}

fn parse_frame(frame: &[u8]) -> Frame {
    let text = match std::str::from_utf8(frame) {
        Ok(text) => text,
        Err(e) => {
            return Frame::Chunk(Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            )));
        }
    };

    let mut event_type = None;
    let mut data_lines = Vec::new();
    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => data_lines.push(value),
            "event" => event_type = Some(value),
            _ => {}
        }
    }

    if data_lines.is_empty() {
        return Frame::Skip;
    }
    let data = data_lines.join("\n");
    if data.trim() == DONE_MARKER {
        return Frame::Done;
    }
    if event_type == Some("error") {
        return Frame::Chunk(Err(Error::api(
            500,
            Some("stream_error".to_string()),
            data,
        )));
    }
    Frame::Chunk(parse_chunk(&data))
}

fn parse_chunk(data: &str) -> Result<ChatCompletionChunk> {
    let value: Value = serde_json::from_str(data).map_err(|e| {
        Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        )
    })?;
    if let Some(err) = value.get("error").filter(|err| !err.is_null()) {
        return Err(stream_error_payload(err));
    }
    serde_json::from_value(value).map_err(|e| {
        Error::serialization(
            format!("Failed to parse completion chunk: {e}"),
            Some(Box::new(e)),
        )
    })
}

/// Convert an in-band `{"error": ...}` payload into an API error.
fn stream_error_payload(err: &Value) -> Error {
    let message = match err {
        Value::String(message) => message.clone(),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| err.to_string()),
        _ => err.to_string(),
    };
    let status_code = err
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .unwrap_or(500);
    let error_type = err.get("type").and_then(Value::as_str).map(String::from);
    Error::api(status_code, error_type, message)
}
