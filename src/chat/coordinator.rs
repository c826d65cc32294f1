//! Turn coordination
//!
//! A turn goes `Idle -> Sending -> Streaming -> {Completed, Failed}`. Only
//! one turn runs at a time; submissions while one is in flight are dropped,
//! not queued. Failed turns are never retried here, the user resends.

use super::error::{RequestError, TurnError};
use super::transcript::{Message, Transcript};
use super::transport::{ChatRequest, ChatTransport, ConversationSummary};
use super::{ChatView, TaskRefreshListener};
use crate::config::START_SCREEN;
use crate::session::{ChatSecret, SessionError, SessionOpener};
use crate::stream::{event_stream, ProtocolEvent};
use futures::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Reply shown in place of the assistant message when a turn fails
pub const APOLOGY: &str = "I'm having trouble connecting right now. Please try again in a moment.";

const CONNECT_FAILED: &str = "Failed to connect to chat service. Please refresh the page.";

/// How a call to [`ChatSession::send`] ended
#[derive(Debug)]
pub enum TurnOutcome {
    Completed,
    Failed(TurnError),
    /// Nothing was sent and the transcript is unchanged
    Rejected(RejectReason),
    /// The view closed mid-turn; late events were discarded
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyInput,
    Busy,
    NotConnected,
    Closed,
}

/// Result of picking a start-screen prompt
#[derive(Debug)]
pub enum PromptAction {
    /// Sentence starter placed in the draft for the user to finish
    Prefilled,
    Sent(TurnOutcome),
    UnknownPrompt,
}

#[derive(Default)]
struct ChatState {
    transcript: Transcript,
    conversation_id: Option<i64>,
    secret: Option<ChatSecret>,
    in_flight: bool,
    draft: String,
    error: Option<String>,
}

struct Inner {
    transport: Arc<dyn ChatTransport>,
    view: Arc<dyn ChatView>,
    listeners: Mutex<Vec<Arc<dyn TaskRefreshListener>>>,
    state: Mutex<ChatState>,
    alive: CancellationToken,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate state unless the view has closed, then publish the transcript.
    fn update<R>(&self, f: impl FnOnce(&mut ChatState) -> R) -> Option<R> {
        if self.alive.is_cancelled() {
            return None;
        }
        let (result, messages) = {
            let mut state = self.state();
            let result = f(&mut state);
            (result, state.transcript.messages().to_vec())
        };
        self.view.transcript_changed(&messages);
        Some(result)
    }

    fn set_error(&self, error: Option<String>) {
        if self.alive.is_cancelled() {
            return;
        }
        self.state().error.clone_from(&error);
        self.view.error_changed(error.as_deref());
    }
}

/// Clears the in-flight flag on every exit path of a turn.
struct InFlightGuard {
    inner: Arc<Inner>,
    focus: bool,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.state().in_flight = false;
        if self.focus && !self.inner.alive.is_cancelled() {
            self.inner.view.focus_input();
        }
    }
}

/// What a turn needs after it has been admitted
struct Turn {
    assistant_id: String,
    request: ChatRequest,
    secret: ChatSecret,
}

/// One chat view: transcript, conversation continuity, and the turn loop
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn ChatTransport>, view: Arc<dyn ChatView>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                view,
                listeners: Mutex::new(Vec::new()),
                state: Mutex::new(ChatState::default()),
                alive: CancellationToken::new(),
            }),
        }
    }

    /// Open a chat session and keep its secret.
    ///
    /// Unauthorized is left to the opener's login redirect; other failures
    /// also set the error banner.
    pub async fn connect(&self, opener: &SessionOpener) -> Result<(), SessionError> {
        match opener.open().await {
            Ok(secret) => {
                if !self.inner.alive.is_cancelled() {
                    self.inner.state().secret = Some(secret);
                    self.inner.set_error(None);
                }
                Ok(())
            }
            Err(SessionError::Unauthorized) => Err(SessionError::Unauthorized),
            Err(e) => {
                self.inner.set_error(Some(CONNECT_FAILED.to_string()));
                Err(e)
            }
        }
    }

    #[cfg(test)]
    pub fn set_secret(&self, secret: ChatSecret) {
        self.inner.state().secret = Some(secret);
    }

    pub fn subscribe_task_refresh(&self, listener: Arc<dyn TaskRefreshListener>) {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.state().transcript.messages().to_vec()
    }

    pub fn conversation_id(&self) -> Option<i64> {
        self.inner.state().conversation_id
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state().in_flight
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        self.inner.state().secret.is_some()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state().error.clone()
    }

    pub fn draft(&self) -> String {
        self.inner.state().draft.clone()
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        self.inner.state().draft = text.into();
    }

    /// Send whatever is in the draft
    pub async fn submit_draft(&self) -> TurnOutcome {
        let draft = self.draft();
        self.send(&draft).await
    }

    /// Pick a start-screen prompt by index
    pub async fn choose_prompt(&self, index: usize) -> PromptAction {
        let Some(prompt) = START_SCREEN.prompts.get(index) else {
            return PromptAction::UnknownPrompt;
        };
        if prompt.is_partial() {
            self.set_draft(prompt.prompt);
            if !self.inner.alive.is_cancelled() {
                self.inner.view.focus_input();
            }
            PromptAction::Prefilled
        } else {
            PromptAction::Sent(self.send(prompt.prompt).await)
        }
    }

    /// Mark the view as gone. Running turns stop touching state; their
    /// network streams are simply dropped.
    pub fn close(&self) {
        self.inner.alive.cancel();
    }

    /// Run one turn for `input`.
    pub async fn send(&self, input: &str) -> TurnOutcome {
        let message = input.trim();
        if message.is_empty() {
            return TurnOutcome::Rejected(RejectReason::EmptyInput);
        }

        let (turn, _guard) = match self.begin_turn(message) {
            Ok(admitted) => admitted,
            Err(reason) => {
                tracing::debug!(?reason, "Turn rejected");
                return TurnOutcome::Rejected(reason);
            }
        };

        let result = self.stream_turn(&turn).await;
        self.finish_turn(&turn, result)
    }

    /// Load earlier messages into an empty transcript.
    ///
    /// Returns how many messages were restored.
    pub async fn restore_history(&self, limit: u32) -> Result<usize, RequestError> {
        let (secret, conversation_id, _guard) = self.begin_request()?;

        let history = self
            .inner
            .transport
            .history(&secret, conversation_id, limit)
            .await?;

        let restored = self.inner.update(|state| {
            if !state.transcript.is_empty() {
                return 0;
            }
            let count = history.messages.len();
            state.transcript.extend_restored(history.messages);
            if state.conversation_id.is_none() {
                state.conversation_id = history.conversation_id;
            }
            count
        });

        let restored = restored.unwrap_or(0);
        tracing::info!(restored, conversation_id = ?self.conversation_id(), "History restored");
        Ok(restored)
    }

    /// Most recent conversations, newest first
    pub async fn list_conversations(
        &self,
        limit: u32,
    ) -> Result<Vec<ConversationSummary>, RequestError> {
        let secret = self
            .inner
            .state()
            .secret
            .clone()
            .ok_or(RequestError::NotConnected)?;
        self.inner.transport.conversations(&secret, limit).await
    }

    /// Admit a turn: append the user message and an empty streaming reply.
    fn begin_turn(&self, message: &str) -> Result<(Turn, InFlightGuard), RejectReason> {
        if self.inner.alive.is_cancelled() {
            return Err(RejectReason::Closed);
        }

        let turn = {
            let mut state = self.inner.state();
            if state.in_flight {
                return Err(RejectReason::Busy);
            }
            let secret = state.secret.clone().ok_or(RejectReason::NotConnected)?;

            state.in_flight = true;
            state.transcript.push_user(message);
            state.draft.clear();
            let assistant_id = state.transcript.push_assistant_placeholder();

            Turn {
                assistant_id,
                request: ChatRequest {
                    message: message.to_string(),
                    conversation_id: state.conversation_id,
                },
                secret,
            }
        };
        let guard = InFlightGuard {
            inner: self.inner.clone(),
            focus: true,
        };

        self.inner.set_error(None);
        self.inner.update(|_| ());
        tracing::debug!(conversation_id = ?turn.request.conversation_id, "Turn started");

        Ok((turn, guard))
    }

    fn begin_request(
        &self,
    ) -> Result<(ChatSecret, Option<i64>, InFlightGuard), RequestError> {
        let mut state = self.inner.state();
        if state.in_flight {
            return Err(RequestError::Busy);
        }
        let secret = state.secret.clone().ok_or(RequestError::NotConnected)?;
        state.in_flight = true;
        let conversation_id = state.conversation_id;
        drop(state);

        let guard = InFlightGuard {
            inner: self.inner.clone(),
            focus: false,
        };
        Ok((secret, conversation_id, guard))
    }

    async fn stream_turn(&self, turn: &Turn) -> Result<(), TurnError> {
        let body = self
            .inner
            .transport
            .open_stream(&turn.secret, &turn.request)
            .await?;
        let mut events = event_stream(body);

        let mut accumulated = String::new();
        let mut announced = false;

        while let Some(event) = events.next().await {
            let event = event?;
            if self.inner.alive.is_cancelled() {
                return Err(TurnError::Abandoned);
            }

            match event {
                ProtocolEvent::Conversation { conversation_id } => {
                    if !announced {
                        announced = true;
                        self.adopt_conversation(conversation_id)?;
                    }
                }
                ProtocolEvent::Delta { content } => {
                    accumulated.push_str(&content);
                    self.inner
                        .update(|state| {
                            state
                                .transcript
                                .set_streaming_content(&turn.assistant_id, accumulated.as_str())
                        })
                        .ok_or(TurnError::Abandoned)?;
                }
                ProtocolEvent::Done {
                    content,
                    conversation_id,
                } => {
                    if let (false, Some(id)) = (announced, conversation_id) {
                        self.adopt_conversation(id)?;
                    }
                    let reply = content.unwrap_or(accumulated);
                    self.finalize_reply(&turn.assistant_id, reply)?;
                    return Ok(());
                }
                ProtocolEvent::Error { error } => return Err(TurnError::Remote(error)),
            }
        }

        // Body ended without a `done` record; keep what arrived
        self.finalize_reply(&turn.assistant_id, accumulated)
    }

    fn adopt_conversation(&self, conversation_id: i64) -> Result<(), TurnError> {
        let previous = self
            .inner
            .update(|state| state.conversation_id.replace(conversation_id))
            .ok_or(TurnError::Abandoned)?;
        if previous != Some(conversation_id) {
            tracing::info!(conversation_id, ?previous, "Conversation assigned");
        }
        Ok(())
    }

    fn finalize_reply(&self, assistant_id: &str, reply: String) -> Result<(), TurnError> {
        self.inner
            .update(|state| state.transcript.finalize(assistant_id, reply))
            .ok_or(TurnError::Abandoned)
            .map(|_| ())
    }

    fn finish_turn(&self, turn: &Turn, result: Result<(), TurnError>) -> TurnOutcome {
        match result {
            Ok(()) => {
                tracing::info!(conversation_id = ?self.conversation_id(), "Turn completed");
                self.notify_tasks_changed();
                TurnOutcome::Completed
            }
            // A closed view outranks whatever failure followed it
            Err(e) if matches!(e, TurnError::Abandoned) || self.inner.alive.is_cancelled() => {
                tracing::debug!(error = %e, "Turn abandoned, chat view closed");
                TurnOutcome::Abandoned
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    session_expired = e.is_session_expired(),
                    "Chat turn failed"
                );
                self.inner
                    .update(|state| state.transcript.finalize(&turn.assistant_id, APOLOGY));
                self.inner.set_error(Some(e.to_string()));
                TurnOutcome::Failed(e)
            }
        }
    }

    fn notify_tasks_changed(&self) {
        let listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.tasks_changed();
        }
    }
}
