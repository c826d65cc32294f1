//! Typed protocol events

use serde::Deserialize;

/// One record of the chat stream protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// Server-side conversation thread for this turn, usually first
    Conversation { conversation_id: i64 },
    /// Text fragment to append to the assistant reply
    Delta { content: String },
    /// End of turn. `content`, when present, is the authoritative reply text.
    Done {
        content: Option<String>,
        conversation_id: Option<i64>,
    },
    /// End of turn with a failure
    Error { error: String },
}

/// Loose wire shape; every field is optional so `null`s and missing fields
/// are handled in one place instead of failing the whole record.
#[derive(Debug, Deserialize)]
pub(super) struct WireRecord {
    r#type: String,
    #[serde(default)]
    conversation_id: Option<i64>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl WireRecord {
    /// `None` for records that carry nothing actionable.
    pub(super) fn into_event(self) -> Option<ProtocolEvent> {
        match self.r#type.as_str() {
            "conversation" => self
                .conversation_id
                .map(|conversation_id| ProtocolEvent::Conversation { conversation_id }),
            "delta" => self
                .content
                .filter(|c| !c.is_empty())
                .map(|content| ProtocolEvent::Delta { content }),
            "done" => Some(ProtocolEvent::Done {
                content: self.content.filter(|c| !c.is_empty()),
                conversation_id: self.conversation_id,
            }),
            "error" => Some(ProtocolEvent::Error {
                error: self
                    .error
                    .unwrap_or_else(|| "Chat request failed".to_string()),
            }),
            other => {
                tracing::debug!(record_type = other, "Skipping unknown record type");
                None
            }
        }
    }
}
