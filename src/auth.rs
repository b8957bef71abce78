//! Login, logout and status against the local credential store.
//!
//! A token is only persisted after the API has accepted it.  There is no
//! refresh: a token that stops working is reported as an authentication
//! error by whichever call notices.

use std::fmt;

use crate::client::ChatApi;
use crate::config::CredentialStore;
use crate::error::{Error, Result};

/// Whether a token is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    /// A token is stored; `hint` is a masked form safe to print.
    LoggedIn { hint: String },
    /// No token is stored.
    LoggedOut,
}

impl AuthStatus {
    /// Returns true when a token is stored.
    pub fn is_logged_in(&self) -> bool {
        matches!(self, AuthStatus::LoggedIn { .. })
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthStatus::LoggedIn { hint } => write!(f, "Logged in (token {hint})"),
            AuthStatus::LoggedOut => write!(f, "Not logged in"),
        }
    }
}

/// Validate `token` and persist it.
///
/// `connect` builds a client for the candidate token; the token is accepted
/// when that client can list the first page of chats.  On failure the store
/// is left untouched and the API error is returned.
pub async fn login<A, F>(store: &CredentialStore, token: &str, connect: F) -> Result<String>
where
    A: ChatApi,
    F: FnOnce(String) -> Result<A>,
{
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::validation(
            "token must not be empty",
            Some("token".to_string()),
        ));
    }
    let client = connect(token.to_string())?;
    client.list_chats(1).await?;
    store.set_token(token)?;
    Ok(token.to_string())
}

/// Remove the stored token and the default chat pointer.  Idempotent.
pub fn logout(store: &CredentialStore) -> Result<()> {
    store.clear_token()?;
    store.clear_default_chat()
}

/// Report whether a token is stored.  A `config.json` that does not parse
/// holds no usable token.
pub fn status(store: &CredentialStore) -> Result<AuthStatus> {
    let token = match store.token() {
        Ok(token) => token,
        Err(err) if err.is_config() => None,
        Err(err) => return Err(err),
    };
    Ok(match token {
        Some(token) => AuthStatus::LoggedIn {
            hint: mask_token(&token),
        },
        None => AuthStatus::LoggedOut,
    })
}

fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}
