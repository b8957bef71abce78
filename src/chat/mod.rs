//! Interactive chat mode.
//!
//! This module provides the pieces of the streaming REPL behind
//! `inception-api chat`. It supports:
//!
//! - Streaming responses with real-time token display
//! - Conversation history replayed on every request
//! - Slash commands for session control
//!
//! # Architecture
//!
//! - [`session`]: conversation state and streaming API interaction
//! - [`commands`]: slash command parsing

mod commands;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use session::{ChatSession, SessionStats};
