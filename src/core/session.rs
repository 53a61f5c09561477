//! Session model and persistence abstraction

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authenticated identity issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: String,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::zero())
    }

    /// True if the session expires in less than `margin` from now.
    pub fn expires_within(&self, margin: Duration) -> bool {
        Utc::now() + margin >= self.expires_at
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Session storage error: {0}")]
pub struct StorageError(pub String);

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self(format!("invalid session payload: {e}"))
    }
}

/// Single-slot durable storage for the current session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the persisted session, `None` when signed out.
    async fn load(&self) -> Result<Option<Session>, StorageError>;

    /// Persists `session`, replacing any previous value.
    async fn save(&self, session: &Session) -> Result<(), StorageError>;

    /// Removes the persisted session. Clearing an empty store is not an error.
    async fn clear(&self) -> Result<(), StorageError>;
}
