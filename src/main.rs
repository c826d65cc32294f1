//! todo-chat - terminal client for the task assistant
//!
//! Opens an authenticated chat session and streams assistant replies
//! turn by turn.

mod chat;
mod config;
mod session;
mod stream;

use chat::{
    ChatSession, ChatView, HttpChatTransport, Message, PromptAction, RejectReason, Role,
    TaskRefreshListener, TurnOutcome,
};
use config::{ChatConfig, START_SCREEN};
use session::{HttpIdentityProvider, HttpSessionBackend, LoginRedirect, SessionError, SessionOpener};
use futures::future::OptionFuture;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HISTORY_LIMIT: u32 = 50;
const CONVERSATION_LIMIT: u32 = 10;
const EXIT_LOGIN_REQUIRED: i32 = 2;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they don't interleave with the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todo_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = ChatConfig::from_env();
    tracing::info!(api = %config.api_url, auth = %config.auth_url, "Starting chat client");

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;

    let opener = SessionOpener::new(
        Arc::new(HttpIdentityProvider::new(client.clone(), &config)),
        Arc::new(HttpSessionBackend::new(client.clone(), &config)),
    )
    .with_login_redirect(Arc::new(TerminalLogin {
        login_url: config.login_url.clone(),
    }));

    let session = ChatSession::new(
        Arc::new(HttpChatTransport::new(client, &config)),
        Arc::new(TerminalView::default()),
    );
    session.subscribe_task_refresh(Arc::new(TaskListNotice));

    connect_or_exit(&session, &opener).await?;
    print_start_screen();

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    show_input_marker(&session);

    // Input keeps being read while a reply streams
    let mut live: Option<Submission> = None;
    loop {
        tokio::select! {
            // Polling the turn first marks the session busy before more input is read
            biased;
            Some(outcome) = OptionFuture::from(live.as_mut()), if live.is_some() => {
                live = None;
                if let Some(outcome) = outcome {
                    handle_outcome(&session, &opener, outcome).await?;
                }
                show_input_marker(&session);
            }
            line = lines.next() => {
                let Some(line) = line else { break };
                let line = line?;
                match Command::parse(&line) {
                    Command::Quit => break,
                    Command::History => restore_history(&session).await,
                    Command::Conversations => list_conversations(&session).await,
                    Command::Prompt(index) => {
                        dispatch(&session, &opener, &mut live, prompt_turn(&session, index)).await?;
                    }
                    Command::Say(text) => {
                        dispatch(&session, &opener, &mut live, say_turn(&session, text)).await?;
                    }
                }
                if live.is_none() {
                    show_input_marker(&session);
                }
            }
        }
    }

    session.close();
    Ok(())
}

/// A submitted line or prompt; `None` when nothing was sent
type Submission = Pin<Box<dyn Future<Output = Option<TurnOutcome>>>>;

/// Make `submission` the live turn, or run it inline when a turn is
/// already streaming. The session rejects it as busy without waiting.
async fn dispatch(
    session: &ChatSession,
    opener: &SessionOpener,
    live: &mut Option<Submission>,
    submission: Submission,
) -> Result<(), Box<dyn std::error::Error>> {
    if live.is_none() {
        *live = Some(submission);
    } else if let Some(outcome) = submission.await {
        handle_outcome(session, opener, outcome).await?;
    }
    Ok(())
}

fn prompt_turn(session: &ChatSession, index: usize) -> Submission {
    let session = session.clone();
    Box::pin(async move {
        match session.choose_prompt(index).await {
            PromptAction::Sent(outcome) => Some(outcome),
            PromptAction::Prefilled => None,
            PromptAction::UnknownPrompt => {
                eprintln!("No prompt #{}", index + 1);
                None
            }
        }
    })
}

fn say_turn(session: &ChatSession, text: &str) -> Submission {
    let session = session.clone();
    let text = text.to_string();
    Box::pin(async move {
        let draft = session.draft();
        // A busy session must not swallow the line into the draft
        if draft.is_empty() || session.is_loading() {
            Some(session.send(&text).await)
        } else {
            session.set_draft(format!("{draft}{text}"));
            Some(session.submit_draft().await)
        }
    })
}

async fn connect_or_exit(
    session: &ChatSession,
    opener: &SessionOpener,
) -> Result<(), Box<dyn std::error::Error>> {
    match session.connect(opener).await {
        Ok(()) => Ok(()),
        Err(SessionError::Unauthorized) => std::process::exit(EXIT_LOGIN_REQUIRED),
        Err(e) => {
            tracing::error!(error = %e, status = e.status(), "Could not open chat session");
            Err(e.into())
        }
    }
}

async fn handle_outcome(
    session: &ChatSession,
    opener: &SessionOpener,
    outcome: TurnOutcome,
) -> Result<(), Box<dyn std::error::Error>> {
    match outcome {
        TurnOutcome::Failed(e) if e.is_session_expired() => {
            tracing::warn!("Chat secret rejected, opening a new session");
            connect_or_exit(session, opener).await?;
        }
        TurnOutcome::Rejected(RejectReason::Busy) => {
            eprintln!("Still answering, message dropped.");
        }
        TurnOutcome::Rejected(RejectReason::NotConnected) => {
            let reason = session.error().unwrap_or_else(|| "no chat session".to_string());
            eprintln!("Not connected: {reason}");
        }
        _ => {}
    }
    Ok(())
}

async fn restore_history(session: &ChatSession) {
    match session.restore_history(HISTORY_LIMIT).await {
        Ok(0) => println!("(no earlier messages)"),
        Ok(_) => {
            for message in session.messages() {
                print_message(&message);
            }
        }
        Err(e) => eprintln!("Could not load history: {e}"),
    }
}

async fn list_conversations(session: &ChatSession) {
    match session.list_conversations(CONVERSATION_LIMIT).await {
        Ok(conversations) if conversations.is_empty() => println!("(no conversations yet)"),
        Ok(conversations) => {
            for c in conversations {
                println!(
                    "#{} {} (updated {})",
                    c.id,
                    c.title,
                    c.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Err(e) => eprintln!("Could not list conversations: {e}"),
    }
}

fn print_start_screen() {
    println!("{}", START_SCREEN.greeting);
    for (i, prompt) in START_SCREEN.prompts.iter().enumerate() {
        println!("  /{} {}", i + 1, prompt.label);
    }
    println!("  /history  /conversations  /quit");
}

fn print_message(message: &Message) {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    println!("{who}> {}", message.content);
}

fn show_input_marker(session: &ChatSession) {
    print!("you> {}", session.draft());
    let _ = std::io::stdout().flush();
}

/// One line of user input
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Quit,
    History,
    Conversations,
    /// Zero-based start-screen prompt
    Prompt(usize),
    Say(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            "/quit" | "/exit" => Self::Quit,
            "/history" => Self::History,
            "/conversations" => Self::Conversations,
            other => other
                .strip_prefix('/')
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n >= 1)
                .map_or(Self::Say(line), |n| Self::Prompt(n - 1)),
        }
    }
}

/// Where the live reply has been printed up to
struct ReplyCursor {
    id: String,
    printed: String,
}

/// Echoes the streaming reply as fragments arrive
#[derive(Default)]
struct TerminalView {
    cursor: Mutex<Option<ReplyCursor>>,
}

impl ChatView for TerminalView {
    fn transcript_changed(&self, messages: &[Message]) {
        let Some(last) = messages.last().filter(|m| m.role == Role::Assistant) else {
            return;
        };
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);

        let is_new = cursor.as_ref().map_or(true, |c| c.id != last.id);
        if is_new {
            // Restored history is printed by the command, not here
            if !last.is_streaming {
                return;
            }
            print!("assistant> ");
            *cursor = Some(ReplyCursor {
                id: last.id.clone(),
                printed: String::new(),
            });
        }
        let Some(reply) = cursor.as_mut() else {
            return;
        };

        match last.content.strip_prefix(reply.printed.as_str()) {
            Some(rest) => print!("{rest}"),
            // Replaced wholesale (authoritative final text or apology)
            None => print!("\nassistant> {}", last.content),
        }
        reply.printed.clone_from(&last.content);

        if !last.is_streaming {
            println!();
            *cursor = None;
        }
        let _ = std::io::stdout().flush();
    }

    fn error_changed(&self, error: Option<&str>) {
        if let Some(error) = error {
            eprintln!("! {error}");
        }
    }
}

struct TaskListNotice;

impl TaskRefreshListener for TaskListNotice {
    fn tasks_changed(&self) {
        tracing::debug!("Task refresh requested");
        println!("(tasks may have changed)");
    }
}

struct TerminalLogin {
    login_url: String,
}

impl LoginRedirect for TerminalLogin {
    fn redirect_to_login(&self) {
        eprintln!(
            "Not logged in. Sign in at {} and set TODO_CHAT_SESSION_COOKIE.",
            self.login_url
        );
    }
}
