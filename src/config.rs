//! Chat client configuration
//!
//! Endpoints come from the environment; retry schedules are fixed.

use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_AUTH_URL: &str = "http://localhost:3000";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Credential fetch right after login can race the identity provider.
pub const CREDENTIAL_RETRY: RetryPolicy = RetryPolicy::new(5, Duration::from_millis(150));

/// Session open retries on 503 and network failures (backend cold start).
pub const SESSION_RETRY: RetryPolicy = RetryPolicy::new(5, Duration::from_millis(200));

/// Bounded linear backoff: wait `base_delay * attempt` after a failed attempt.
///
/// Only the schedule lives here. Each caller decides for itself which
/// outcomes are worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay to wait after the 1-indexed `attempt` failed, or `None` if it was the last one.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            None
        } else {
            Some(self.base_delay * attempt)
        }
    }
}

/// Endpoint configuration for the chat client
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Backend origin, e.g. `http://localhost:8000`
    pub api_url: String,
    /// Identity provider origin
    pub auth_url: String,
    /// Identity session cookie (`name=value`) presented to the provider
    pub session_cookie: Option<String>,
    pub login_url: String,
    pub request_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            session_cookie: None,
            login_url: format!("{DEFAULT_AUTH_URL}/login"),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Self {
        let api_url = std::env::var("TODO_CHAT_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let auth_url = std::env::var("TODO_CHAT_AUTH_URL")
            .unwrap_or_else(|_| DEFAULT_AUTH_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let login_url =
            std::env::var("TODO_CHAT_LOGIN_URL").unwrap_or_else(|_| format!("{auth_url}/login"));
        let request_timeout = std::env::var("TODO_CHAT_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(
                Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
                Duration::from_secs,
            );

        Self {
            api_url,
            auth_url,
            session_cookie: std::env::var("TODO_CHAT_SESSION_COOKIE").ok(),
            login_url,
            request_timeout,
        }
    }

    pub fn chat_url(&self) -> String {
        format!("{}/chatkit", self.api_url)
    }

    pub fn session_url(&self) -> String {
        format!("{}/api/chatkit/session", self.api_url)
    }

    pub fn history_url(&self) -> String {
        format!("{}/api/chatkit/history", self.api_url)
    }

    pub fn conversations_url(&self) -> String {
        format!("{}/api/chatkit/conversations", self.api_url)
    }

    pub fn identity_session_url(&self) -> String {
        format!("{}/api/auth/get-session", self.auth_url)
    }

    pub fn identity_token_url(&self) -> String {
        format!("{}/api/auth/token", self.auth_url)
    }
}

/// A canned prompt on the start screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartPrompt {
    pub label: &'static str,
    pub prompt: &'static str,
}

impl StartPrompt {
    /// Prompts ending in a space are sentence starters for the user to finish.
    pub fn is_partial(&self) -> bool {
        self.prompt.ends_with(' ')
    }
}

/// What an empty chat shows before the first turn
pub struct StartScreen {
    pub greeting: &'static str,
    pub prompts: &'static [StartPrompt],
}

pub const START_SCREEN: StartScreen = StartScreen {
    greeting: "Hi! I can help you manage your tasks. What would you like to do?",
    prompts: &[
        StartPrompt {
            label: "Show my tasks",
            prompt: "Show me all my tasks",
        },
        StartPrompt {
            label: "Add a task",
            prompt: "Add a task to ",
        },
        StartPrompt {
            label: "What can you do?",
            prompt: "What can you help me with?",
        },
    ],
};
