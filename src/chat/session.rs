//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which manages conversation
//! state and handles streaming API interactions.

use std::time::Duration;

use futures::StreamExt;

use crate::Error;
use crate::client::ChatApi;
use crate::error::Result;
use crate::observability::{SESSION_INTERRUPTS, SESSION_TURNS};
use crate::render::Renderer;
use crate::types::{ChatCompletionRequest, CompletionOptions, Message, Usage};

/// A chat session that manages conversation state and API interactions.
///
/// The session maintains message history for one server-side chat and
/// replays it on every completion request.
pub struct ChatSession<C: ChatApi> {
    client: C,
    chat_id: String,
    session_id: String,
    model: String,
    messages: Vec<Message>,
    usage_totals: Usage,
    last_turn_usage: Option<Usage>,
    request_count: u64,
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// The model used for the session.
    pub model: String,
    /// The server-side chat the session talks to.
    pub chat_id: String,
    /// The session id sent with every completion.
    pub session_id: String,
    /// The number of messages in the conversation.
    pub message_count: usize,
    /// Total number of completed replies.
    pub total_requests: u64,
    /// Prompt tokens reported across all replies.
    pub total_prompt_tokens: u64,
    /// Completion tokens reported across all replies.
    pub total_completion_tokens: u64,
    /// Usage reported for the last reply, if the server sent any.
    pub last_turn_usage: Option<Usage>,
}

impl<C: ChatApi> ChatSession<C> {
    /// Creates a new chat session bound to `chat_id`.
    pub fn new(client: C, chat_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            chat_id: chat_id.into(),
            session_id: ChatCompletionRequest::generate_session_id(),
            model: model.into(),
            messages: Vec::new(),
            usage_totals: Usage::default(),
            last_turn_usage: None,
            request_count: 0,
        }
    }

    /// Sends a user message and streams the response.
    ///
    /// This method:
    /// 1. Adds the user message to history
    /// 2. Sends a streaming request to the API
    /// 3. Renders response chunks as they arrive
    /// 4. Adds the complete assistant response to history
    ///
    /// The renderer's interrupt flag is watched while the request is opened
    /// and while each chunk is awaited; when it is set the stream is dropped
    /// and [`Error::Abort`] is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request or the stream fails.  History is
    /// left as it was before the call.
    pub async fn send_streaming(
        &mut self,
        user_input: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<String> {
        if user_input.trim().is_empty() {
            return Err(Error::validation(
                "message must not be empty",
                Some("message".to_string()),
            ));
        }

        let previous_len = self.messages.len();
        let mut user = Message::user(user_input).with_models(vec![self.model.clone()]);
        if let Some(last) = self.messages.last() {
            user = user.with_parent_id(last.id.clone());
        }
        let user_id = user.id.clone();
        self.messages.push(user);

        match self.stream_reply(renderer).await {
            Ok((reply, usage)) => {
                renderer.finish_response();
                self.messages.push(
                    Message::assistant(reply.clone())
                        .with_models(vec![self.model.clone()])
                        .with_parent_id(user_id),
                );
                self.record_usage(usage);
                SESSION_TURNS.click();
                Ok(reply)
            }
            Err(err) => {
                self.messages.truncate(previous_len);
                Err(err)
            }
        }
    }

    async fn stream_reply(&self, renderer: &mut dyn Renderer) -> Result<(String, Option<Usage>)> {
        let options = CompletionOptions::new()
            .with_model(self.model.clone())
            .with_session_id(self.session_id.clone())
            .with_chat_id(self.chat_id.clone());
        let opened = tokio::select! {
            biased;
            () = wait_for_interrupt(&*renderer) => None,
            result = self.client.chat_completion(self.messages.clone(), options) => Some(result),
        };
        let Some(stream) = opened else {
            return Err(interrupted(renderer));
        };
        let mut stream = stream?;

        let mut reply = String::new();
        let mut usage = None;
        loop {
            let next = tokio::select! {
                biased;
                () = wait_for_interrupt(&*renderer) => None,
                chunk = stream.next() => Some(chunk),
            };
            let Some(next) = next else {
                return Err(interrupted(renderer));
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            if let Some(text) = chunk.content() {
                renderer.print_text(text);
                reply.push_str(text);
            }
            let filtered = chunk.filtered_categories();
            if !filtered.is_empty() {
                renderer.print_filtered(&filtered);
            }
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
        }
        Ok((reply, usage))
    }

    /// Clears the conversation history.
    ///
    /// The server-side chat is kept; later messages start a fresh context.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Returns the conversation history.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the number of messages in the conversation.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Changes the model used for responses.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Returns the current model.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the chat this session talks to.
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            model: self.model.clone(),
            chat_id: self.chat_id.clone(),
            session_id: self.session_id.clone(),
            message_count: self.message_count(),
            total_requests: self.request_count,
            total_prompt_tokens: u64::from(self.usage_totals.prompt_tokens),
            total_completion_tokens: u64::from(self.usage_totals.completion_tokens),
            last_turn_usage: self.last_turn_usage,
        }
    }

    fn record_usage(&mut self, usage: Option<Usage>) {
        self.request_count = self.request_count.saturating_add(1);
        self.last_turn_usage = usage;
        if let Some(usage) = usage {
            self.usage_totals = self.usage_totals + usage;
        }
    }
}

/// How often a pending read re-checks the renderer's interrupt flag.
const INTERRUPT_POLL: Duration = Duration::from_millis(50);

/// Resolves once the renderer asks for the reply to stop.
async fn wait_for_interrupt(renderer: &dyn Renderer) {
    let mut ticks = tokio::time::interval(INTERRUPT_POLL);
    loop {
        ticks.tick().await;
        if renderer.should_interrupt() {
            return;
        }
    }
}

fn interrupted(renderer: &mut dyn Renderer) -> Error {
    SESSION_INTERRUPTS.click();
    renderer.print_interrupted();
    Error::abort("reply interrupted by user")
}
