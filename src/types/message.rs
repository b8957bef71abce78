use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Role of the author of a message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User role.
    User,

    /// Assistant role.
    Assistant,

    /// System role.
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            _ => Err(format!("Unknown message role: {s}")),
        }
    }
}

/// A single message in a conversation.
///
/// Messages are values: they are created by the caller and serialized as-is
/// when a chat is created or a completion is requested.  The `id` and
/// `timestamp` are filled in at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier of the message.
    #[serde(default = "new_message_id")]
    pub id: String,

    /// Identifier of the message this one replies to.
    #[serde(default)]
    pub parent_id: Option<String>,

    /// Identifiers of the replies to this message.
    #[serde(default)]
    pub children_ids: Vec<String>,

    /// The role of the author.
    pub role: MessageRole,

    /// The text of the message.
    pub content: String,

    /// Creation time in unix seconds.
    #[serde(default)]
    pub timestamp: Option<i64>,

    /// Models this message was addressed to.
    #[serde(default)]
    pub models: Vec<String>,
}

impl Message {
    /// Create a new `Message` with a fresh id and the current timestamp.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            parent_id: None,
            children_ids: Vec::new(),
            role,
            content: content.into(),
            timestamp: Some(OffsetDateTime::now_utc().unix_timestamp()),
            models: Vec::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Set the models this message is addressed to.
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    /// Set the parent message id.
    pub fn with_parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

impl From<&str> for Message {
    fn from(content: &str) -> Self {
        Self::user(content)
    }
}

impl From<String> for Message {
    fn from(content: String) -> Self {
        Self::user(content)
    }
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn message_defaults() {
        let message = Message::user("test message");
        assert_eq!(message.role, MessageRole::User);
        assert_eq!(message.content, "test message");
        assert!(message.models.is_empty());
        assert!(message.children_ids.is_empty());
        assert!(message.parent_id.is_none());
        assert!(message.timestamp.is_some());
        assert!(Uuid::parse_str(&message.id).is_ok());
    }

    #[test]
    fn messages_get_distinct_ids() {
        let a = Message::user("a");
        let b = Message::user("a");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn role_serialization() {
        assert_eq!(to_value(MessageRole::User).unwrap(), json!("user"));
        assert_eq!(to_value(MessageRole::Assistant).unwrap(), json!("assistant"));
        assert_eq!(to_value(MessageRole::System).unwrap(), json!("system"));
        assert_eq!("system".parse::<MessageRole>(), Ok(MessageRole::System));
        assert!("robot".parse::<MessageRole>().is_err());
    }

    #[test]
    fn message_serialization_shape() {
        let mut message = Message::assistant("Hello").with_models(vec!["m".to_string()]);
        message.id = "msg-1".to_string();
        message.timestamp = Some(1742265411);
        let json = to_value(&message).unwrap();
        assert_eq!(
            json,
            json!({
                "id": "msg-1",
                "parent_id": null,
                "children_ids": [],
                "role": "assistant",
                "content": "Hello",
                "timestamp": 1742265411,
                "models": ["m"]
            })
        );
    }

    #[test]
    fn message_deserialization_fills_defaults() {
        let message: Message =
            serde_json::from_value(json!({"role": "user", "content": "2+2?"})).unwrap();
        assert_eq!(message.role, MessageRole::User);
        assert_eq!(message.content, "2+2?");
        assert!(!message.id.is_empty());
        assert!(message.timestamp.is_none());
    }
}
