use crate::core::session::{Session, SessionStore, StorageError};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

/// Process-local session slot, lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<Session>, StorageError> {
        let session = self.inner.lock().await.clone();
        debug!(found = session.is_some(), "Session LOAD");
        Ok(session)
    }

    async fn save(&self, session: &Session) -> Result<(), StorageError> {
        *self.inner.lock().await = Some(session.clone());
        debug!(user_id = %session.user_id, "Session SAVE");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.inner.lock().await.take();
        debug!("Session CLEAR");
        Ok(())
    }
}
