//! Mock implementations for chat tests

use super::error::{RequestError, TurnError};
use super::transcript::Message;
use super::transport::{ChatRequest, ChatTransport, ConversationSummary, History};
use super::{ChatView, TaskRefreshListener};
use crate::session::ChatSecret;
use crate::stream::ByteStream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ============================================================================
// Wire helpers
// ============================================================================

pub fn conversation(id: i64) -> String {
    format!("data: {{\"type\":\"conversation\",\"conversation_id\":{id}}}\n\n")
}

pub fn delta(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "type": "delta", "content": text })
    )
}

pub fn done(content: Option<&str>, conversation_id: Option<i64>) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "type": "done", "content": content, "conversation_id": conversation_id })
    )
}

pub fn error(message: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "type": "error", "error": message })
    )
}

// ============================================================================
// Mock transport
// ============================================================================

enum MockReply {
    Chunks(Vec<Result<Bytes, std::io::Error>>),
    /// Chunks held back until the gate is notified
    Gated(Arc<Notify>, Vec<Result<Bytes, std::io::Error>>),
    Fail(TurnError),
}

/// Transport that replays queued bodies and records every request
pub struct MockTransport {
    replies: Mutex<VecDeque<MockReply>>,
    history: Mutex<Option<History>>,
    pub requests: Mutex<Vec<ChatRequest>>,
    /// Notified when a stream request is issued
    pub request_started: Arc<Notify>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            history: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            request_started: Arc::new(Notify::new()),
        }
    }

    /// Queue a body delivered as the given chunks
    pub fn queue_chunks(&self, chunks: &[&str]) {
        let chunks = chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        self.replies.lock().unwrap().push_back(MockReply::Chunks(chunks));
    }

    /// Queue records, one chunk each
    pub fn queue_records(&self, records: &[String]) {
        let refs: Vec<&str> = records.iter().map(String::as_str).collect();
        self.queue_chunks(&refs);
    }

    /// Queue records followed by a read failure
    pub fn queue_broken(&self, records: &[String]) {
        self.replies
            .lock()
            .unwrap()
            .push_back(MockReply::Chunks(broken_chunks(records)));
    }

    pub fn queue_gated(&self, gate: Arc<Notify>, records: &[String]) {
        self.replies.lock().unwrap().push_back(MockReply::Gated(
            gate,
            vec![Ok(Bytes::from(records.concat()))],
        ));
    }

    /// Like `queue_broken`, but nothing arrives until the gate opens
    pub fn queue_gated_broken(&self, gate: Arc<Notify>, records: &[String]) {
        self.replies
            .lock()
            .unwrap()
            .push_back(MockReply::Gated(gate, broken_chunks(records)));
    }

    pub fn queue_failure(&self, error: TurnError) {
        self.replies.lock().unwrap().push_back(MockReply::Fail(error));
    }

    pub fn set_history(&self, history: History) {
        *self.history.lock().unwrap() = Some(history);
    }

    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn open_stream(
        &self,
        _secret: &ChatSecret,
        request: &ChatRequest,
    ) -> Result<ByteStream, TurnError> {
        self.requests.lock().unwrap().push(request.clone());
        self.request_started.notify_one();

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockReply::Fail(TurnError::Network("No mock reply queued".into())));

        match reply {
            MockReply::Chunks(chunks) => Ok(futures::stream::iter(chunks).boxed()),
            MockReply::Gated(gate, chunks) => Ok(futures::stream::once(async move {
                gate.notified().await;
                futures::stream::iter(chunks)
            })
            .flatten()
            .boxed()),
            MockReply::Fail(e) => Err(e),
        }
    }

    async fn history(
        &self,
        _secret: &ChatSecret,
        _conversation_id: Option<i64>,
        _limit: u32,
    ) -> Result<History, RequestError> {
        self.history
            .lock()
            .unwrap()
            .take()
            .ok_or(RequestError::Http {
                status: 404,
                message: "no history".into(),
            })
    }

    async fn conversations(
        &self,
        _secret: &ChatSecret,
        _limit: u32,
    ) -> Result<Vec<ConversationSummary>, RequestError> {
        Ok(Vec::new())
    }
}

fn broken_chunks(records: &[String]) -> Vec<Result<Bytes, std::io::Error>> {
    let mut chunks: Vec<Result<Bytes, std::io::Error>> = records
        .iter()
        .map(|r| Ok(Bytes::from(r.clone())))
        .collect();
    chunks.push(Err(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "connection reset by peer",
    )));
    chunks
}

// ============================================================================
// Recording view and listener
// ============================================================================

/// View that records what it was shown
#[derive(Default)]
pub struct RecordingView {
    /// Content of the trailing message after each transcript change
    pub tail_contents: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<Option<String>>>,
    pub focus_count: AtomicUsize,
}

impl RecordingView {
    pub fn focus_count(&self) -> usize {
        self.focus_count.load(Ordering::SeqCst)
    }
}

impl ChatView for RecordingView {
    fn transcript_changed(&self, messages: &[Message]) {
        if let Some(last) = messages.last() {
            self.tail_contents.lock().unwrap().push(last.content.clone());
        }
    }

    fn error_changed(&self, error: Option<&str>) {
        self.errors.lock().unwrap().push(error.map(str::to_string));
    }

    fn focus_input(&self) {
        self.focus_count.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct CountingListener {
    pub count: AtomicUsize,
}

impl CountingListener {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl TaskRefreshListener for CountingListener {
    fn tasks_changed(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
