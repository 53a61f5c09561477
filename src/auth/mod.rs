//! Authentication session lifecycle
//!
//! [`AuthController`] is the only writer of the [`SessionStore`]. It moves
//! between `Unauthenticated`, `Authenticating` and `Authenticated`, and
//! returns to the prior state whenever an attempt fails.

pub mod oauth;

use crate::core::identity::{
    AuthError, AuthorizeRequest, BrowserOutcome, BrowserSession, IdentityProvider,
    PendingAccount,
};
use crate::core::session::{Session, SessionStore};
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use oauth::parse_implicit_grant;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Sessions closer than this to expiry are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthOutcome {
    SignedIn(Session),
    /// Browser dismissed or no usable tokens came back. Not an error.
    Cancelled,
}

pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if email.contains('@') {
        Ok(())
    } else {
        Err(AuthError::InvalidCredentialFormat(format!(
            "'{email}' is not a valid email address"
        )))
    }
}

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() >= MIN_PASSWORD_LEN {
        Ok(())
    } else {
        Err(AuthError::InvalidCredentialFormat(format!(
            "password must have at least {MIN_PASSWORD_LEN} characters"
        )))
    }
}

pub struct AuthController {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn SessionStore>,
    callback_url: String,
    state: watch::Sender<AuthState>,
}

impl AuthController {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn SessionStore>,
        callback_url: &str,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::Unauthenticated);
        Self {
            provider,
            store,
            callback_url: callback_url.to_string(),
            state,
        }
    }

    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == AuthState::Authenticated
    }

    /// Receives every state transition.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Loads the persisted session at startup.
    pub async fn restore(&self) -> Result<Option<Session>, AuthError> {
        let session = self.store.load().await?;
        match &session {
            Some(s) => {
                info!(user_id = %s.user_id, "Restored persisted session");
                self.transition(AuthState::Authenticated);
            }
            None => {
                debug!("No persisted session");
                self.transition(AuthState::Unauthenticated);
            }
        }
        Ok(session)
    }

    /// Creates an account that stays pending until the user confirms it by
    /// e-mail. The state is left untouched.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<PendingAccount, AuthError> {
        validate_email(email)?;
        validate_password(password)?;

        let account = self.provider.sign_up(email, password).await?;
        info!(user_id = %account.user_id, "Account created, awaiting confirmation");
        Ok(account)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        validate_email(email)?;
        validate_password(password)?;

        let previous = self.transition(AuthState::Authenticating);
        let result = self.provider.sign_in_with_password(email, password).await;
        let session = self.settle(previous, result)?;
        self.establish(session, previous).await
    }

    /// Runs the implicit-grant browser flow for `provider_name`.
    ///
    /// The tokens come back in the fragment of the callback URL and are
    /// exchanged for a session here. A dismissed browser or a callback
    /// without both tokens yields [`OAuthOutcome::Cancelled`].
    pub async fn sign_in_with_oauth(
        &self,
        provider_name: &str,
        browser: &dyn BrowserSession,
    ) -> Result<OAuthOutcome, AuthError> {
        let request = AuthorizeRequest {
            provider: provider_name.to_string(),
            redirect_to: self.callback_url.clone(),
            skip_browser_redirect: true,
        };

        let previous = self.transition(AuthState::Authenticating);
        let result = self.provider.authorize_url(&request).await;
        let url = self.settle(previous, result)?;
        debug!(provider = %provider_name, "Opening browser for OAuth");

        let landed = match browser.open(&url, &self.callback_url).await {
            BrowserOutcome::Redirected(landed)
                if oauth::matches_callback(&landed, &self.callback_url) =>
            {
                landed
            }
            BrowserOutcome::Redirected(landed) => {
                info!(%landed, "Browser did not return to the callback, treating as cancelled");
                self.transition(previous);
                return Ok(OAuthOutcome::Cancelled);
            }
            BrowserOutcome::Dismissed => {
                info!("OAuth browser dismissed");
                self.transition(previous);
                return Ok(OAuthOutcome::Cancelled);
            }
        };

        let Some(tokens) = parse_implicit_grant(&landed) else {
            info!("OAuth callback carried no session tokens");
            self.transition(previous);
            return Ok(OAuthOutcome::Cancelled);
        };

        let result = self.provider.set_session(&tokens).await.map_err(|e| match e {
            AuthError::Provider(_) => e,
            other => AuthError::Provider(other.to_string()),
        });
        let session = self.settle(previous, result)?;
        self.establish(session, previous)
            .await
            .map(OAuthOutcome::SignedIn)
    }

    /// Signs out with the provider when possible and always clears the
    /// stored session.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        match self.store.load().await {
            Ok(Some(session)) => {
                if let Err(e) = self.provider.sign_out(&session.access_token).await {
                    warn!(error = %e, "Provider sign-out failed, clearing local session anyway");
                }
            }
            Ok(None) => debug!("Sign-out without a stored session"),
            Err(e) => warn!(error = %e, "Could not read session for provider sign-out"),
        }

        let cleared = self.store.clear().await;
        self.transition(AuthState::Unauthenticated);
        info!("Signed out");
        cleared.map_err(AuthError::from)
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        validate_email(email)?;
        self.provider.reset_password(email).await?;
        info!("Password reset e-mail requested");
        Ok(())
    }

    /// Returns the stored session, refreshing it first when it is about to
    /// expire.
    ///
    /// A refresh the provider rejects means the session was revoked: it is
    /// cleared and the error returned. Transient failures leave it in place.
    pub async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(session) = self.store.load().await? else {
            self.transition(AuthState::Unauthenticated);
            return Ok(None);
        };

        if !session.expires_within(Duration::seconds(REFRESH_MARGIN_SECS)) {
            return Ok(Some(session));
        }

        debug!(expires_at = %session.expires_at, "Refreshing session");
        match self.provider.refresh_session(&session.refresh_token).await {
            Ok(refreshed) => {
                self.store.save(&refreshed).await?;
                self.transition(AuthState::Authenticated);
                Ok(Some(refreshed))
            }
            Err(AuthError::AuthenticationFailed(message)) => {
                warn!(%message, "Session was revoked, clearing it");
                self.store.clear().await?;
                self.transition(AuthState::Unauthenticated);
                Err(AuthError::AuthenticationFailed(message))
            }
            Err(e) => Err(e),
        }
    }

    async fn establish(&self, session: Session, previous: AuthState) -> Result<Session, AuthError> {
        let saved = self.store.save(&session).await;
        self.settle(previous, saved)?;
        self.transition(AuthState::Authenticated);
        info!(user_id = %session.user_id, "Signed in");
        Ok(session)
    }

    /// Restores `previous` if `result` failed.
    fn settle<T, E>(&self, previous: AuthState, result: Result<T, E>) -> Result<T, AuthError>
    where
        AuthError: From<E>,
    {
        result.map_err(|e| {
            self.transition(previous);
            AuthError::from(e)
        })
    }

    /// Sets the state, returning the one it replaced.
    fn transition(&self, next: AuthState) -> AuthState {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(?previous, ?next, "Auth state changed");
        }
        previous
    }
}
