//! Chat session acquisition
//!
//! Two layers, each with its own retry policy:
//! - the identity provider may not have a token yet right after login
//! - the chat backend may not be ready to mint a `client_secret` yet

mod credential;
mod error;
mod http;
mod opener;

pub use credential::acquire_credential;
pub use error::SessionError;
pub use http::{HttpIdentityProvider, HttpSessionBackend};
pub use opener::SessionOpener;

use async_trait::async_trait;
use std::fmt;

/// Bearer token from the identity provider. Only held for one session-open call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Chat-scoped secret returned by the session endpoint.
///
/// Stays valid until the identity session ends; that is only noticed
/// when a later request comes back 401.
#[derive(Clone, PartialEq, Eq)]
pub struct ChatSecret(String);

impl ChatSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ChatSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChatSecret(***)")
    }
}

/// Issues credentials bound to the caller's identity session
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Whether the caller is logged in at all
    async fn has_active_session(&self) -> Result<bool, SessionError>;

    /// A bearer token for the current session, if the provider has one yet
    async fn fetch_token(&self) -> Result<Option<Credential>, SessionError>;
}

/// The backend call that exchanges a credential for a chat secret
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn create_session(&self, credential: &Credential) -> Result<ChatSecret, SessionError>;
}

/// Hands control to whatever owns routing when the user must log in again
pub trait LoginRedirect: Send + Sync {
    fn redirect_to_login(&self);
}
