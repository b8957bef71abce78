//! Logging trait for Inception client operations.
//!
//! This module provides the [`ClientLogger`] trait that allows users to capture
//! and log all API interactions passing through the [`Inception`] client, and
//! [`JsonLinesLogger`], which appends one JSON object per interaction to a
//! file.
//!
//! [`Inception`]: crate::Inception

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::json;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::{Chat, ChatCompletionChunk, ChatCompletionRequest, ChatList};

/// A trait for logging Inception client operations.
///
/// Implementations must not fail the request they observe; errors while
/// logging are theirs to swallow.
///
/// # Example
///
/// ```rust,ignore
/// use inception::{ChatCompletionChunk, ClientLogger};
///
/// struct StderrLogger;
///
/// impl ClientLogger for StderrLogger {
///     fn log_stream_chunk(&self, chunk: &ChatCompletionChunk) {
///         eprintln!("chunk: {:?}", chunk.content());
///     }
///     // ...
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log a chat returned by a successful create call.
    fn log_chat_created(&self, chat: &Chat);

    /// Log a page returned by a list call.
    fn log_chat_list(&self, page: u32, chats: &ChatList);

    /// Log a successful delete call.
    fn log_chat_deleted(&self, chat_id: &str);

    /// Log a completion request before it is sent.
    fn log_completion_request(&self, request: &ChatCompletionRequest);

    /// Log an individual streamed chunk.
    ///
    /// Called once per chunk, in arrival order.
    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk);
}

/// A [`ClientLogger`] writing JSON lines to a file.
///
/// Each line is an object with `ts` (unix seconds), `event`, and `payload`.
pub struct JsonLinesLogger {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesLogger {
    /// Open `path` for appending, creating it if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(|err| Error::io("failed to open log file", err))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn write_event<T: Serialize>(&self, event: &str, payload: &T) {
        let line = json!({
            "ts": OffsetDateTime::now_utc().unix_timestamp(),
            "event": event,
            "payload": payload,
        });
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{line}");
            let _ = writer.flush();
        }
    }
}

impl ClientLogger for JsonLinesLogger {
    fn log_chat_created(&self, chat: &Chat) {
        self.write_event("chat_created", chat);
    }

    fn log_chat_list(&self, page: u32, chats: &ChatList) {
        self.write_event("chat_list", &json!({"page": page, "chats": chats}));
    }

    fn log_chat_deleted(&self, chat_id: &str) {
        self.write_event("chat_deleted", &json!({"id": chat_id}));
    }

    fn log_completion_request(&self, request: &ChatCompletionRequest) {
        self.write_event("completion_request", request);
    }

    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk) {
        self.write_event("stream_chunk", chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatSummary;
    use serde_json::Value;

    #[test]
    fn writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.jsonl");
        let logger = JsonLinesLogger::open(&path).unwrap();

        logger.log_chat_deleted("c1");
        logger.log_stream_chunk(&ChatCompletionChunk::text("Hello"));
        logger.log_chat_list(1, &ChatList::new(vec![ChatSummary::new("c2", "Two")]));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["event"], "chat_deleted");
        assert_eq!(lines[0]["payload"]["id"], "c1");
        assert_eq!(
            lines[1]["payload"]["choices"][0]["delta"]["content"],
            "Hello"
        );
        assert_eq!(lines[2]["payload"]["chats"]["chats"][0]["id"], "c2");
        assert!(lines[2]["ts"].as_i64().is_some());
    }

    #[test]
    fn appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.jsonl");
        JsonLinesLogger::open(&path).unwrap().log_chat_deleted("a");
        JsonLinesLogger::open(&path).unwrap().log_chat_deleted("b");
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
