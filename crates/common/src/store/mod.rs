//! Project store
//!
//! Projects and the theme preference are stored as JSON text under fixed
//! keys in a [`KeyValueStore`] backend. Reads never fail the caller:
//! missing or corrupt data is logged and treated as no prior state.

mod file;
mod memory;
mod redis;

pub use self::file::FileStore;
pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::errors::StoreError;
use crate::models::{Project, ThemePreference};

/// Key holding the serialized project list
pub const PROJECTS_KEY: &str = "paperlens.projects";

/// Key holding the stored theme preference
pub const THEME_KEY: &str = "paperlens.theme";

/// Raw text storage under string keys
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<(), StoreError>;

    fn backend_name(&self) -> &str;
}

/// Typed access to persisted projects and preferences
#[derive(Clone)]
pub struct ProjectStore {
    backend: Arc<dyn KeyValueStore>,
}

impl ProjectStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// In-memory store, for tests and throwaway runs
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.backend_name()
    }

    /// All stored projects, or an empty list when nothing usable is stored
    pub async fn load_projects(&self) -> Vec<Project> {
        match self.read_json(PROJECTS_KEY).await {
            Some(projects) => projects,
            None => Vec::new(),
        }
    }

    /// Replace the stored project list. An empty list is not written.
    pub async fn save_projects(&self, projects: &[Project]) -> Result<(), StoreError> {
        if projects.is_empty() {
            debug!("Skipping save of empty project list");
            return Ok(());
        }
        let json = serde_json::to_string(projects)?;
        self.backend.write(PROJECTS_KEY, &json).await?;
        debug!(count = projects.len(), backend = self.backend_name(), "Projects saved");
        Ok(())
    }

    pub async fn load_theme(&self) -> Option<ThemePreference> {
        self.read_json(THEME_KEY).await
    }

    pub async fn save_theme(&self, theme: ThemePreference) -> Result<(), StoreError> {
        let json = serde_json::to_string(&theme)?;
        self.backend.write(THEME_KEY, &json).await
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.backend.ping().await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.read(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to read stored state, starting empty");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = key, error = %e, "Stored state is corrupt, ignoring it");
                None
            }
        }
    }
}

/// Build the configured backend
pub async fn create_store(config: &StorageConfig) -> Result<ProjectStore, StoreError> {
    let backend: Arc<dyn KeyValueStore> = match config.backend.as_str() {
        "file" => Arc::new(FileStore::new(&config.data_dir).await?),
        "memory" => Arc::new(MemoryStore::new()),
        "redis" => Arc::new(RedisStore::connect(&config.redis_url, &config.key_prefix).await?),
        other => return Err(StoreError::UnknownBackend(other.to_string())),
    };
    Ok(ProjectStore::new(backend))
}
