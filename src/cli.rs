//! Subcommands of the `inception-api` tool.
//!
//! Global options are parsed by [`InceptionArgs`](crate::InceptionArgs); the
//! remaining free arguments name a [`Command`].  Each command body is a
//! function over [`ChatApi`] so it can run against any client.

use std::error;
use std::fmt;
use std::io::Write;

use crate::chat::ChatSession;
use crate::client::ChatApi;
use crate::config::CredentialStore;
use crate::error::{Error, Result};
use crate::render::Renderer;
use crate::types::{Chat, ChatList};

/// Usage line for the tool.
pub const USAGE: &str = "inception-api [OPTIONS] <COMMAND> [ARGS]";

/// Opening message for chats created without one.
pub const DEFAULT_FIRST_MESSAGE: &str = "Hello!";

/// A parsed subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Validate and store a token.
    AuthLogin,
    /// Forget the stored token.
    AuthLogout,
    /// Report whether a token is stored.
    AuthStatus,
    /// Create a chat opening with `message`.
    ChatsNew { message: String },
    /// List one page of chats.
    ChatsList { page: u32 },
    /// Delete a chat.
    ChatsDelete { chat_id: String },
    /// Make a chat the default.
    ChatsSetDefault { chat_id: String },
    /// Send one message to the default chat.
    Input { text: String },
    /// Start the interactive loop.
    Chat,
    /// Print the command summary.
    Help,
}

/// The free arguments do not name a valid command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError {
    message: String,
}

impl UsageError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl error::Error for UsageError {}

impl Command {
    /// Parse the free arguments left after the global options.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> std::result::Result<Command, UsageError> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        match args.as_slice() {
            [] => Err(UsageError::new("missing command")),
            ["help"] | ["--help"] | ["-h"] => Ok(Command::Help),
            ["auth", "login"] => Ok(Command::AuthLogin),
            ["auth", "logout"] => Ok(Command::AuthLogout),
            ["auth", "status"] => Ok(Command::AuthStatus),
            ["auth", ..] => Err(UsageError::new("usage: auth login|logout|status")),
            ["chats", "new"] => Ok(Command::ChatsNew {
                message: DEFAULT_FIRST_MESSAGE.to_string(),
            }),
            ["chats", "new", words @ ..] => Ok(Command::ChatsNew {
                message: words.join(" "),
            }),
            ["chats", "list" | "ls"] => Ok(Command::ChatsList { page: 1 }),
            ["chats", "list" | "ls", page] => match page.parse::<u32>() {
                Ok(page) if page >= 1 => Ok(Command::ChatsList { page }),
                _ => Err(UsageError::new(format!(
                    "page must be a positive integer, got {page:?}"
                ))),
            },
            ["chats", "delete", chat_id] => Ok(Command::ChatsDelete {
                chat_id: chat_id.to_string(),
            }),
            ["chats", "set-default", chat_id] => Ok(Command::ChatsSetDefault {
                chat_id: chat_id.to_string(),
            }),
            ["chats", ..] => Err(UsageError::new(
                "usage: chats new [MESSAGE] | list [PAGE] | delete <ID> | set-default <ID>",
            )),
            ["input"] => Err(UsageError::new("usage: input <TEXT>")),
            ["input", words @ ..] => Ok(Command::Input {
                text: words.join(" "),
            }),
            ["chat"] => Ok(Command::Chat),
            [other, ..] => Err(UsageError::new(format!("unknown command: {other}"))),
        }
    }

    /// True for the `auth` commands, which must work even when the stored
    /// settings cannot be read.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Command::AuthLogin | Command::AuthLogout | Command::AuthStatus
        )
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Commands:
  auth login                 Validate a token and store it
  auth logout                Forget the stored token and default chat
  auth status                Show whether a token is stored
  chats new [MESSAGE]        Create a chat (default message: Hello!)
  chats list [PAGE]          List chats (alias: ls)
  chats delete <ID>          Delete a chat
  chats set-default <ID>     Use a chat for `input` and `chat`
  input <TEXT>               Send one message to the default chat
  chat                       Start an interactive chat session"#
}

/// Create a chat and print its id.
pub async fn new_chat<C, W>(client: &C, model: &str, message: &str, out: &mut W) -> Result<Chat>
where
    C: ChatApi + ?Sized,
    W: Write,
{
    let chat = client.create_chat(message, model).await?;
    writeln!(out, "Created new chat with ID: {}", chat.id)?;
    Ok(chat)
}

/// Print one page of chats as a table, marking the default.
pub async fn list_chats<C, W>(
    client: &C,
    store: &CredentialStore,
    page: u32,
    out: &mut W,
) -> Result<ChatList>
where
    C: ChatApi + ?Sized,
    W: Write,
{
    let chats = client.list_chats(page).await?;
    let default_chat = store.default_chat()?;
    if chats.is_empty() {
        writeln!(out, "No chats on page {page}.")?;
        return Ok(chats);
    }

    let id_width = chats
        .iter()
        .map(|c| c.id.chars().count())
        .max()
        .unwrap_or(0)
        .max("ID".len());
    let title_width = chats
        .iter()
        .map(|c| c.display_title().chars().count())
        .max()
        .unwrap_or(0)
        .max("Title".len());
    writeln!(out, "{:<id_width$}  {:<title_width$}  Default", "ID", "Title")?;
    for chat in chats.iter() {
        let marker = if default_chat.as_deref() == Some(chat.id.as_str()) {
            "*"
        } else {
            ""
        };
        let row = format!(
            "{:<id_width$}  {:<title_width$}  {marker}",
            chat.id,
            chat.display_title()
        );
        writeln!(out, "{}", row.trim_end())?;
    }
    Ok(chats)
}

/// Delete a chat, clearing the default pointer if it named that chat.
pub async fn delete_chat<C, W>(
    client: &C,
    store: &CredentialStore,
    chat_id: &str,
    out: &mut W,
) -> Result<()>
where
    C: ChatApi + ?Sized,
    W: Write,
{
    client.delete_chat(chat_id).await?;
    if store.default_chat()?.as_deref() == Some(chat_id) {
        store.clear_default_chat()?;
    }
    writeln!(out, "Deleted chat {chat_id}")?;
    Ok(())
}

/// Make `chat_id` the default after checking the first page lists it.
pub async fn set_default_chat<C, W>(
    client: &C,
    store: &CredentialStore,
    chat_id: &str,
    out: &mut W,
) -> Result<()>
where
    C: ChatApi + ?Sized,
    W: Write,
{
    if chat_id.trim().is_empty() {
        return Err(Error::validation(
            "chat id must not be empty",
            Some("chat_id".to_string()),
        ));
    }
    let chats = client.list_chats(1).await?;
    if !chats.contains(chat_id) {
        return Err(Error::not_found(
            format!("chat {chat_id} does not exist"),
            Some("chat".to_string()),
            Some(chat_id.to_string()),
        ));
    }
    store.set_default_chat(chat_id)?;
    writeln!(out, "Set {chat_id} as default chat")?;
    Ok(())
}

/// Stream the reply to `text` in the default chat.
pub async fn send_input<C: ChatApi>(
    client: C,
    store: &CredentialStore,
    model: &str,
    text: &str,
    renderer: &mut dyn Renderer,
) -> Result<String> {
    let Some(chat_id) = store.default_chat()? else {
        return Err(Error::config(
            "no default chat set; use `inception-api chats set-default <ID>` first",
        ));
    };
    let mut session = ChatSession::new(client, chat_id, model);
    session.send_streaming(text, renderer).await
}

/// Return the default chat, creating and storing one when none is set.
///
/// The boolean is true when a chat was created.
pub async fn ensure_default_chat<C>(
    client: &C,
    store: &CredentialStore,
    model: &str,
) -> Result<(String, bool)>
where
    C: ChatApi + ?Sized,
{
    if let Some(chat_id) = store.default_chat()? {
        return Ok((chat_id, false));
    }
    let chat = client.create_chat(DEFAULT_FIRST_MESSAGE, model).await?;
    store.set_default_chat(&chat.id)?;
    Ok((chat.id, true))
}
