use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Message;

/// Model used when the caller does not name one.
pub const DEFAULT_MODEL: &str = "lambda.mercury-coder-small";

/// Length of generated session ids.
const SESSION_ID_LEN: usize = 20;

/// Per-request options for a chat completion.
///
/// Unset fields are filled in when the request is built: the model falls back
/// to [`DEFAULT_MODEL`], the session id to a fresh 20 character id and the
/// chat id to a fresh uuid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionOptions {
    /// Model to complete with.
    pub model: Option<String>,
    /// Session the completion belongs to.
    pub session_id: Option<String>,
    /// Chat the completion belongs to.
    pub chat_id: Option<String>,
}

impl CompletionOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the session id.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the chat id.
    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }
}

/// Request body for a streamed chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Always true; completions are streamed.
    pub stream: bool,
    /// Model to complete with.
    pub model: String,
    /// Conversation so far, oldest first.
    pub messages: Vec<Message>,
    /// Session identifier.
    pub session_id: String,
    /// Chat identifier.
    pub chat_id: String,
    /// Identifier of this request.
    pub id: String,
}

impl ChatCompletionRequest {
    /// Build a request, filling unset options with generated values.
    pub fn new(messages: Vec<Message>, options: CompletionOptions) -> Self {
        Self {
            stream: true,
            model: options.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            messages,
            session_id: options
                .session_id
                .unwrap_or_else(Self::generate_session_id),
            chat_id: options
                .chat_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            id: Uuid::new_v4().to_string(),
        }
    }

    /// A fresh session id: the first 20 hex digits of a random uuid.
    pub fn generate_session_id() -> String {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(SESSION_ID_LEN);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_generated() {
        let request = ChatCompletionRequest::new(vec![Message::user("sup?")], CompletionOptions::new());
        assert!(request.stream);
        assert_eq!(request.model, DEFAULT_MODEL);
        assert_eq!(request.session_id.len(), SESSION_ID_LEN);
        assert!(!request.session_id.contains('-'));
        assert!(Uuid::parse_str(&request.chat_id).is_ok());
        assert!(Uuid::parse_str(&request.id).is_ok());
    }

    #[test]
    fn options_are_respected() {
        let options = CompletionOptions::new()
            .with_model("custom-model")
            .with_session_id("session")
            .with_chat_id("c1");
        let request = ChatCompletionRequest::new(vec![Message::user("hey")], options);
        assert_eq!(request.model, "custom-model");
        assert_eq!(request.session_id, "session");
        assert_eq!(request.chat_id, "c1");
    }

    #[test]
    fn serialized_fields() {
        let request = ChatCompletionRequest::new(
            vec![Message::user("hello")],
            CompletionOptions::new().with_chat_id("c1"),
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["chat_id"], "c1");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
    }
}
