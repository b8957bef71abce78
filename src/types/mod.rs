// Public modules
pub mod chat;
pub mod chat_completion_chunk;
pub mod chat_completion_request;
pub mod chat_list;
pub mod message;
pub mod usage;

// Re-exports
pub use chat::{Chat, ChatHistory, ChatRequest, DEFAULT_CHAT_TITLE};
pub(crate) use chat::ChatResponse;
pub use chat_completion_chunk::{
    ChatCompletionChunk, CompletionChoice, ContentFilterResult, ContentFilterResults, Delta,
};
pub use chat_completion_request::{ChatCompletionRequest, CompletionOptions, DEFAULT_MODEL};
pub use chat_list::{ChatList, ChatSummary};
pub use message::{Message, MessageRole};
pub use usage::Usage;
