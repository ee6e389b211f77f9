use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person typing into the chat pane.
    User,
    /// The model answering on the backend side.
    Assistant,
}

/// A single entry of a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Who wrote this message.
    pub role: Role,
    /// The text of this message.
    pub content: String,
}

impl Message {
    /// Creates a user message.
    #[inline]
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    #[inline]
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Identifier of a conversation, assigned by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wraps a backend-assigned identifier.
    #[inline]
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    #[inline]
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A conversation, as owned by the backend.
///
/// The client only holds a cached copy, and the messages are always kept
/// in chronological order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Conversation {
    /// The identifier of this conversation.
    pub id: ConversationId,
    /// Messages in chronological order.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Creation time in seconds since the Unix epoch.
    pub created_at: i64,
}

impl Conversation {
    /// Creates an empty conversation.
    #[inline]
    pub fn new(id: ConversationId, created_at: i64) -> Self {
        Self {
            id,
            messages: vec![],
            created_at,
        }
    }
}
