use crate::core::session::{Session, SessionStore, StorageError};
use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use tracing::debug;

const PARTITION: &str = "session";
const SESSION_KEY: &str = "current";

fn storage_error(e: fjall::Error) -> StorageError {
    StorageError::new(e.to_string())
}

/// Session slot persisted in a fjall keyspace, surviving restarts.
pub struct FjallSessionStore {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl FjallSessionStore {
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(db_path).map_err(|e| {
            StorageError::new(format!(
                "Failed to create directory {}: {e}",
                db_path.display()
            ))
        })?;

        let keyspace = Config::new(db_path).open().map_err(storage_error)?;
        let partition = keyspace
            .open_partition(PARTITION, PartitionCreateOptions::default())
            .map_err(storage_error)?;
        debug!("Opened session store at {}", db_path.display());
        Ok(Self {
            keyspace,
            partition,
        })
    }

    /// Writes `value` under the session key unchecked.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, value: &[u8]) {
        self.partition.insert(SESSION_KEY, value).unwrap();
    }

    fn sync(&self) -> Result<(), StorageError> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(storage_error)
    }
}

#[async_trait]
impl SessionStore for FjallSessionStore {
    async fn load(&self) -> Result<Option<Session>, StorageError> {
        match self.partition.get(SESSION_KEY).map_err(storage_error)? {
            Some(value) => {
                let session: Session = serde_json::from_slice(&value)?;
                debug!(user_id = %session.user_id, "Session LOAD");
                Ok(Some(session))
            }
            None => {
                debug!("Session LOAD: none stored");
                Ok(None)
            }
        }
    }

    async fn save(&self, session: &Session) -> Result<(), StorageError> {
        let value = serde_json::to_vec(session)?;
        self.partition
            .insert(SESSION_KEY, value)
            .map_err(storage_error)?;
        self.sync()?;
        debug!(user_id = %session.user_id, "Session SAVE");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.partition.remove(SESSION_KEY).map_err(storage_error)?;
        self.sync()?;
        debug!("Session CLEAR");
        Ok(())
    }
}
