//! HTTP adapters for the identity provider and the session endpoint

use super::{ChatSecret, Credential, IdentityProvider, SessionBackend, SessionError};
use crate::config::ChatConfig;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;

/// Identity provider reached over HTTP with the user's session cookie
pub struct HttpIdentityProvider {
    client: Client,
    session_url: String,
    token_url: String,
    cookie: Option<String>,
}

impl HttpIdentityProvider {
    pub fn new(client: Client, config: &ChatConfig) -> Self {
        Self {
            client,
            session_url: config.identity_session_url(),
            token_url: config.identity_token_url(),
            cookie: config.session_cookie.clone(),
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.cookie {
            Some(cookie) => request.header(header::COOKIE, cookie),
            None => request,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdentitySessionBody {
    session: Option<serde_json::Value>,
    user: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    token: Option<String>,
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn has_active_session(&self) -> Result<bool, SessionError> {
        if self.cookie.is_none() {
            return Ok(false);
        }

        let response = self
            .get(&self.session_url)
            .send()
            .await
            .map_err(|e| network_error(&e))?;

        if !response.status().is_success() {
            return Ok(false);
        }

        // The provider answers `null` when there is no session
        let body: Option<IdentitySessionBody> = response
            .json()
            .await
            .map_err(|e| SessionError::Network(format!("Invalid session response: {e}")))?;

        Ok(body.is_some_and(|b| b.session.is_some() && b.user.is_some()))
    }

    async fn fetch_token(&self) -> Result<Option<Credential>, SessionError> {
        let response = self
            .get(&self.token_url)
            .send()
            .await
            .map_err(|e| network_error(&e))?;

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "Token endpoint declined");
            return Ok(None);
        }

        let body: TokenBody = response
            .json()
            .await
            .map_err(|e| SessionError::Network(format!("Invalid token response: {e}")))?;

        Ok(body.token.filter(|t| !t.is_empty()).map(Credential::new))
    }
}

/// The backend's session-creation endpoint
pub struct HttpSessionBackend {
    client: Client,
    url: String,
}

impl HttpSessionBackend {
    pub fn new(client: Client, config: &ChatConfig) -> Self {
        Self {
            client,
            url: config.session_url(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    client_secret: String,
}

/// Error bodies come as `{error, code}` from the session route or `{detail}` from the API.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    detail: Option<String>,
    code: Option<String>,
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn create_session(&self, credential: &Credential) -> Result<ChatSecret, SessionError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(credential.token())
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| network_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SessionError::Network(format!("Failed to read response: {e}")))?;

        session_from_response(status, &body)
    }
}

fn session_from_response(status: StatusCode, body: &str) -> Result<ChatSecret, SessionError> {
    if !status.is_success() {
        return Err(classify_error(status, body));
    }

    // A success status with an unusable body is the backend's fault
    let session: SessionBody = serde_json::from_str(body).map_err(|e| {
        SessionError::from_status(
            StatusCode::BAD_GATEWAY.as_u16(),
            format!("Invalid session response: {e}"),
            None,
        )
    })?;
    Ok(ChatSecret::new(session.client_secret))
}

fn classify_error(status: StatusCode, body: &str) -> SessionError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error
        .or(parsed.detail)
        .unwrap_or_else(|| "Failed to create session".to_string());
    SessionError::from_status(status.as_u16(), message, parsed.code)
}

fn network_error(e: &reqwest::Error) -> SessionError {
    if e.is_timeout() {
        SessionError::Network(format!("Request timeout: {e}"))
    } else if e.is_connect() {
        SessionError::Network(format!("Connection failed: {e}"))
    } else {
        SessionError::Network(format!("Request failed: {e}"))
    }
}
