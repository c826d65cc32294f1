//! Exchanging an identity credential for a chat secret

use super::{
    acquire_credential, ChatSecret, IdentityProvider, LoginRedirect, SessionBackend, SessionError,
};
use crate::config::{RetryPolicy, CREDENTIAL_RETRY, SESSION_RETRY};
use std::sync::Arc;

/// Opens chat sessions against the backend
pub struct SessionOpener {
    identity: Arc<dyn IdentityProvider>,
    backend: Arc<dyn SessionBackend>,
    login: Option<Arc<dyn LoginRedirect>>,
    credential_retry: RetryPolicy,
    session_retry: RetryPolicy,
}

impl SessionOpener {
    pub fn new(identity: Arc<dyn IdentityProvider>, backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            identity,
            backend,
            login: None,
            credential_retry: CREDENTIAL_RETRY,
            session_retry: SESSION_RETRY,
        }
    }

    /// Where to send the user when the session turns out to be unauthorized
    pub fn with_login_redirect(mut self, login: Arc<dyn LoginRedirect>) -> Self {
        self.login = Some(login);
        self
    }

    #[cfg(test)]
    pub fn with_retry(mut self, credential: RetryPolicy, session: RetryPolicy) -> Self {
        self.credential_retry = credential;
        self.session_retry = session;
        self
    }

    /// One pass: check identity, acquire a credential, exchange it.
    pub async fn open_once(&self) -> Result<ChatSecret, SessionError> {
        if !self.identity.has_active_session().await? {
            return Err(SessionError::Unauthorized);
        }

        let credential = acquire_credential(self.identity.as_ref(), self.credential_retry)
            .await
            .ok_or(SessionError::TokenUnavailable)?;

        self.backend.create_session(&credential).await
    }

    /// Open a session, retrying not-ready and network failures.
    ///
    /// `Unauthorized` triggers the login redirect once and is never retried.
    pub async fn open(&self) -> Result<ChatSecret, SessionError> {
        let mut attempt = 1;
        loop {
            let err = match self.open_once().await {
                Ok(secret) => {
                    tracing::info!(attempt, "Chat session opened");
                    return Ok(secret);
                }
                Err(e) => e,
            };

            if err == SessionError::Unauthorized {
                tracing::warn!("Chat session unauthorized, redirecting to login");
                if let Some(login) = &self.login {
                    login.redirect_to_login();
                }
                return Err(err);
            }

            let delay = if err.is_retryable() {
                self.session_retry.delay_after(attempt)
            } else {
                None
            };

            match delay {
                Some(delay) => {
                    tracing::debug!(
                        attempt,
                        error = %err,
                        delay_ms = %delay.as_millis(),
                        "Session attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    tracing::warn!(attempt, error = %err, status = err.status(), "Failed to open chat session");
                    return Err(err);
                }
            }
        }
    }
}
