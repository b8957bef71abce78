use serde::{Deserialize, Serialize};

/// One row of a chat listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    /// Opaque chat identifier.
    pub id: String,

    /// Chat title, when the server reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Last update time as reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,

    /// Creation time as reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl ChatSummary {
    /// Create a summary with an id and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: Some(title.into()),
            updated_at: None,
            created_at: None,
        }
    }

    /// The title for display, `Untitled` when absent.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled")
    }
}

/// A page of chats.
///
/// The server answers either `{"chats": [...]}` or a bare array; both decode
/// to the same value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ChatListRepr")]
pub struct ChatList {
    /// The chats on this page.
    pub chats: Vec<ChatSummary>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChatListRepr {
    Bare(Vec<ChatSummary>),
    Wrapped { chats: Vec<ChatSummary> },
}

impl From<ChatListRepr> for ChatList {
    fn from(repr: ChatListRepr) -> Self {
        match repr {
            ChatListRepr::Bare(chats) | ChatListRepr::Wrapped { chats } => Self { chats },
        }
    }
}

impl ChatList {
    /// Create a page from summaries.
    pub fn new(chats: Vec<ChatSummary>) -> Self {
        Self { chats }
    }

    /// Returns true if a chat with `id` is on this page.
    pub fn contains(&self, id: &str) -> bool {
        self.chats.iter().any(|chat| chat.id == id)
    }

    /// Returns the chat with `id`, if it is on this page.
    pub fn find(&self, id: &str) -> Option<&ChatSummary> {
        self.chats.iter().find(|chat| chat.id == id)
    }

    /// Number of chats on this page.
    pub fn len(&self) -> usize {
        self.chats.len()
    }

    /// Returns true if the page is empty.
    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    /// Iterate over the chats on this page.
    pub fn iter(&self) -> impl Iterator<Item = &ChatSummary> {
        self.chats.iter()
    }
}

impl IntoIterator for ChatList {
    type Item = ChatSummary;
    type IntoIter = std::vec::IntoIter<ChatSummary>;

    fn into_iter(self) -> Self::IntoIter {
        self.chats.into_iter()
    }
}
