//! Conversational turns over the chat stream
//!
//! `ChatSession` owns the transcript and the conversation id. Everything
//! outside this module observes it through `ChatView` and
//! `TaskRefreshListener`.

mod coordinator;
mod error;
mod transcript;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{ChatSession, PromptAction, RejectReason, TurnOutcome};
pub use transcript::{Message, Role};
pub use transport::HttpChatTransport;

/// Presentation hooks. All methods default to doing nothing.
pub trait ChatView: Send + Sync {
    /// Called after every transcript mutation, including each streamed fragment
    fn transcript_changed(&self, _messages: &[Message]) {}

    /// Error banner text, `None` to clear it
    fn error_changed(&self, _error: Option<&str>) {}

    /// A turn has finished one way or another; input may be focused again
    fn focus_input(&self) {}
}

/// Subscribers told that tasks may have changed server-side.
///
/// Purely informational: a missed notification only delays a refresh.
pub trait TaskRefreshListener: Send + Sync {
    fn tasks_changed(&self);
}
