// Public modules
pub mod auth;
pub mod chat;
pub mod cli;
pub mod client;
pub mod client_logger;
pub mod config;
pub mod error;
pub mod render;
pub mod sse;
pub mod types;

mod observability;

// Re-exports
pub use auth::AuthStatus;
pub use client::{ChatApi, ChunkStream, Inception};
pub use client_logger::{ClientLogger, JsonLinesLogger};
pub use config::{Config, CredentialStore, InceptionArgs};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer};
pub use sse::{collect_content, process_sse};
pub use types::*;
