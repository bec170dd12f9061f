//! Chat transcript: ordered, append-only list of messages.
//!
//! A `Transcript` is an immutable snapshot. Every change produces a new
//! snapshot, so a renderer can hold the previous one while the widget
//! publishes the next.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Which corpus a question is answered from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Answer from the whole document (chapter) the reader is on.
    #[default]
    #[serde(rename = "book")]
    WholeDocument,
    /// Answer only from the text the reader highlighted.
    #[serde(rename = "selected-text")]
    Excerpt,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::WholeDocument => write!(f, "book"),
            Mode::Excerpt => write!(f, "selected-text"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
}

impl Message {
    pub fn user(content: impl Into<String>, mode: Mode) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::User,
            content: content.into(),
            mode: Some(mode),
        }
    }

    /// Empty assistant entry that a streamed answer fills in.
    pub fn placeholder(mode: Mode) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Assistant,
            content: String::new(),
            mode: Some(mode),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Assistant,
            content: content.into(),
            mode: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    messages: Arc<[Message]>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self {
            messages: Arc::from(Vec::new()),
        }
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// New snapshot with `message` at the end.
    pub fn append(&self, message: Message) -> Self {
        let mut messages = self.messages.to_vec();
        messages.push(message);
        Self {
            messages: messages.into(),
        }
    }

    /// New snapshot whose last message carries `content`, provided the last
    /// message is `id`. Any other transcript is returned as is.
    pub fn replace_last(&self, id: MessageId, content: &str) -> Self {
        match self.messages.last() {
            Some(last) if last.id == id => {
                let mut messages = self.messages.to_vec();
                let last = messages.len() - 1;
                messages[last] = Message {
                    content: content.to_owned(),
                    ..messages[last].clone()
                };
                Self {
                    messages: messages.into(),
                }
            }
            _ => self.clone(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Serialize for Transcript {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.messages().serialize(serializer)
    }
}
