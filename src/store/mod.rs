pub mod disk;
pub mod memory;

use crate::core::config::AppConfig;
use crate::core::session::SessionStore;
use anyhow::{Context, Result};
use disk::FjallSessionStore;
use std::sync::Arc;

/// Opens the durable session store under the configured data directory.
pub fn open_session_store(config: &AppConfig) -> Result<Arc<dyn SessionStore>> {
    let path = config.default_data_path()?.join("session");
    let store = FjallSessionStore::open(&path)
        .with_context(|| format!("Failed to open session store at {}", path.display()))?;
    Ok(Arc::new(store))
}
