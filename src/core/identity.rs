//! Identity provider and browser abstractions used by the auth flow

use crate::core::session::{Session, StorageError};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Rejected locally, the provider was never contacted.
    #[error("Invalid credential format: {0}")]
    InvalidCredentialFormat(String),

    #[error("{0}")]
    AuthenticationFailed(String),

    #[error("{0}")]
    Provider(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Account created by sign-up, waiting for e-mail confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAccount {
    pub user_id: String,
    pub email: String,
}

/// Tokens carried in an implicit-grant redirect fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRequest {
    pub provider: String,
    pub redirect_to: String,
    /// The caller opens its own browser surface with the returned URL.
    pub skip_browser_redirect: bool,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<PendingAccount, AuthError>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
    -> Result<Session, AuthError>;

    async fn authorize_url(&self, request: &AuthorizeRequest) -> Result<String, AuthError>;

    /// Turns tokens obtained out of band into a provider-validated session.
    async fn set_session(&self, tokens: &OAuthTokens) -> Result<Session, AuthError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;

    async fn reset_password(&self, email: &str) -> Result<(), AuthError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOutcome {
    /// The browser landed on a URL starting with the callback target.
    Redirected(String),
    Dismissed,
}

/// Interactive browser surface for the OAuth redirect.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn open(&self, url: &str, callback_url: &str) -> BrowserOutcome;
}
