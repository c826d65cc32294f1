//! In-memory transcript

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub is_streaming: bool,
    pub created_at: DateTime<Utc>,
}

/// Ordered messages, append-only.
///
/// The only in-place change allowed is to the content of the trailing
/// assistant message while it is streaming, and its one-time finalization.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> String {
        self.push(Role::User, content.into(), false)
    }

    /// Empty streaming reply that deltas will fill in
    pub fn push_assistant_placeholder(&mut self) -> String {
        self.push(Role::Assistant, String::new(), true)
    }

    /// Append already-finished messages, e.g. from history
    pub fn extend_restored(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages
            .extend(messages.into_iter().map(|m| Message {
                is_streaming: false,
                ..m
            }));
    }

    /// Replace the streaming reply's content. Returns false if `id` is not
    /// the trailing streaming assistant message.
    pub fn set_streaming_content(&mut self, id: &str, content: impl Into<String>) -> bool {
        match self.streaming_tail(id) {
            Some(message) => {
                message.content = content.into();
                true
            }
            None => false,
        }
    }

    /// Set final content and stop streaming. Happens at most once per reply.
    pub fn finalize(&mut self, id: &str, content: impl Into<String>) -> bool {
        match self.streaming_tail(id) {
            Some(message) => {
                message.content = content.into();
                message.is_streaming = false;
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn streaming_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_streaming).count()
    }

    fn streaming_tail(&mut self, id: &str) -> Option<&mut Message> {
        self.messages
            .last_mut()
            .filter(|m| m.id == id && m.role == Role::Assistant && m.is_streaming)
    }

    fn push(&mut self, role: Role, content: String, is_streaming: bool) -> String {
        let prefix = match role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        let id = format!("{prefix}-{}", uuid::Uuid::new_v4());
        self.messages.push(Message {
            id: id.clone(),
            role,
            content,
            is_streaming,
            created_at: Utc::now(),
        });
        id
    }
}
