//! Chat backend transport

use super::error::{RequestError, TurnError};
use super::transcript::{Message, Role};
use crate::config::ChatConfig;
use crate::session::ChatSecret;
use crate::stream::ByteStream;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// Body of a chat turn request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    /// Serialized as `null` before the first conversation exists
    pub conversation_id: Option<i64>,
}

/// Restored conversation history
#[derive(Debug, Clone, Default)]
pub struct History {
    pub messages: Vec<Message>,
    pub conversation_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Calls made against the chat backend with a chat secret
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Start a turn and hand back the raw response body
    async fn open_stream(
        &self,
        secret: &ChatSecret,
        request: &ChatRequest,
    ) -> Result<ByteStream, TurnError>;

    async fn history(
        &self,
        secret: &ChatSecret,
        conversation_id: Option<i64>,
        limit: u32,
    ) -> Result<History, RequestError>;

    async fn conversations(
        &self,
        secret: &ChatSecret,
        limit: u32,
    ) -> Result<Vec<ConversationSummary>, RequestError>;
}

/// `ChatTransport` over HTTP
pub struct HttpChatTransport {
    client: Client,
    chat_url: String,
    history_url: String,
    conversations_url: String,
}

impl HttpChatTransport {
    pub fn new(client: Client, config: &ChatConfig) -> Self {
        Self {
            client,
            chat_url: config.chat_url(),
            history_url: config.history_url(),
            conversations_url: config.conversations_url(),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        secret: &ChatSecret,
        query: &[(&str, String)],
    ) -> Result<T, RequestError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(secret.expose())
            .query(query)
            .send()
            .await
            .map_err(|e| RequestError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RequestError::Http {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| RequestError::Decode(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct HistoryBody {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
    conversation_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
    id: String,
    role: String,
    content: String,
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationsBody {
    #[serde(default)]
    conversations: Vec<ConversationBody>,
}

#[derive(Debug, Deserialize)]
struct ConversationBody {
    id: i64,
    title: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn open_stream(
        &self,
        secret: &ChatSecret,
        request: &ChatRequest,
    ) -> Result<ByteStream, TurnError> {
        let response = self
            .client
            .post(&self.chat_url)
            .bearer_auth(secret.expose())
            .json(request)
            .send()
            .await
            .map_err(|e| TurnError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TurnError::Http {
                status: status.as_u16(),
            });
        }
        if status == StatusCode::NO_CONTENT {
            return Err(TurnError::MissingBody);
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other))
            .boxed())
    }

    async fn history(
        &self,
        secret: &ChatSecret,
        conversation_id: Option<i64>,
        limit: u32,
    ) -> Result<History, RequestError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(id) = conversation_id {
            query.push(("conversation_id", id.to_string()));
        }

        let body: HistoryBody = self.get_json(&self.history_url, secret, &query).await?;
        Ok(history_from_body(body))
    }

    async fn conversations(
        &self,
        secret: &ChatSecret,
        limit: u32,
    ) -> Result<Vec<ConversationSummary>, RequestError> {
        let body: ConversationsBody = self
            .get_json(&self.conversations_url, secret, &[("limit", limit.to_string())])
            .await?;

        Ok(body
            .conversations
            .into_iter()
            .map(|c| ConversationSummary {
                id: c.id,
                title: c
                    .title
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| "New conversation".to_string()),
                created_at: parse_timestamp(c.created_at.as_deref()),
                updated_at: parse_timestamp(c.updated_at.as_deref()),
            })
            .collect())
    }
}

fn history_from_body(body: HistoryBody) -> History {
    let messages = body
        .messages
        .into_iter()
        .filter_map(|m| {
            let Some(role) = Role::parse(&m.role) else {
                tracing::debug!(role = %m.role, "Skipping history message with unknown role");
                return None;
            };
            Some(Message {
                id: m.id,
                role,
                content: m.content,
                is_streaming: false,
                created_at: parse_timestamp(m.created_at.as_deref()),
            })
        })
        .collect();

    History {
        messages,
        conversation_id: body.conversation_id,
    }
}

/// Backend timestamps may be RFC 3339 or naive ISO 8601 (taken as UTC).
fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    let Some(raw) = raw else {
        return Utc::now();
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.and_utc())
        })
        .unwrap_or_else(|_| {
            tracing::debug!(timestamp = raw, "Unparseable timestamp");
            Utc::now()
        })
}
