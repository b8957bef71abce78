use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::types::Message;

/// Title given to chats that have not been renamed.
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

/// Message history of a chat, keyed by message id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatHistory {
    /// All messages in the chat, keyed by id.
    #[serde(default)]
    pub messages: BTreeMap<String, Message>,

    /// The id of the most recent message on the active branch.
    #[serde(default)]
    pub current_id: String,
}

impl ChatHistory {
    /// Create a history holding a single message, which becomes current.
    pub fn single(message: Message) -> Self {
        let current_id = message.id.clone();
        let mut messages = BTreeMap::new();
        messages.insert(current_id.clone(), message);
        Self {
            messages,
            current_id,
        }
    }

    /// Returns the current message, if present.
    pub fn current(&self) -> Option<&Message> {
        self.messages.get(&self.current_id)
    }
}

/// A server-side conversation.
///
/// The `id` is empty until the server has accepted the chat; only ids taken
/// from a create response are meaningful to the other operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    /// Opaque identifier assigned by the server.
    #[serde(default)]
    pub id: String,

    /// Human-readable title.
    #[serde(default = "default_title")]
    pub title: String,

    /// Models the chat talks to.
    #[serde(default)]
    pub models: Vec<String>,

    /// Free-form generation parameters.
    #[serde(default)]
    pub params: Map<String, Value>,

    /// Message history.
    #[serde(default)]
    pub history: ChatHistory,

    /// Messages in display order.
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Tags attached to the chat.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Creation time in unix milliseconds.
    #[serde(default = "now_millis")]
    pub timestamp: i64,
}

impl Chat {
    /// Build a new, not yet created chat that opens with `message`.
    pub fn new(message: Message, model: impl Into<String>) -> Self {
        let model = model.into();
        let message = message.with_models(vec![model.clone()]);
        Self {
            id: String::new(),
            title: default_title(),
            models: vec![model],
            params: Map::new(),
            history: ChatHistory::single(message.clone()),
            messages: vec![message],
            tags: Vec::new(),
            timestamp: now_millis(),
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// Request body for creating a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The chat to create.
    pub chat: Chat,
}

/// Response body of the create endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct ChatResponse {
    pub chat: Chat,
}

fn default_title() -> String {
    DEFAULT_CHAT_TITLE.to_string()
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
