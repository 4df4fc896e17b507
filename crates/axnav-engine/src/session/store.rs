//! Session persistence.

use super::Session;
use async_trait::async_trait;
use axnav_common::protocol::ContextId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Keeps at most one session per browsing context.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Save a session, replacing any earlier one for its context.
    async fn save(&self, session: &Session) -> Result<(), StoreError>;

    async fn load(&self, context: &ContextId) -> Result<Option<Session>, StoreError>;

    async fn delete(&self, context: &ContextId) -> Result<(), StoreError>;

    /// All stored sessions, ordered by context.
    async fn list(&self) -> Result<Vec<Session>, StoreError>;
}

/// In-memory session store.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<ContextId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let mut store = self.sessions.write().await;
        store.insert(session.context.clone(), session.clone());
        Ok(())
    }

    async fn load(&self, context: &ContextId) -> Result<Option<Session>, StoreError> {
        let store = self.sessions.read().await;
        Ok(store.get(context).cloned())
    }

    async fn delete(&self, context: &ContextId) -> Result<(), StoreError> {
        let mut store = self.sessions.write().await;
        store.remove(context);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Session>, StoreError> {
        let store = self.sessions.read().await;
        let mut sessions: Vec<_> = store.values().cloned().collect();
        sessions.sort_by(|a, b| a.context.cmp(&b.context));
        Ok(sessions)
    }
}

/// One JSON file per context:
/// ```text
/// {storage_path}/
/// └── sessions/
///     ├── {context}.json
///     └── ...
/// ```
pub struct FileSessionStore {
    storage_path: PathBuf,
}

impl FileSessionStore {
    pub async fn new(storage_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let storage_path = storage_path.into();
        fs::create_dir_all(storage_path.join("sessions")).await?;
        debug!("FileSessionStore initialized at {:?}", storage_path);
        Ok(Self { storage_path })
    }

    fn sessions_dir(&self) -> PathBuf {
        self.storage_path.join("sessions")
    }

    fn session_path(&self, context: &ContextId) -> PathBuf {
        self.sessions_dir()
            .join(format!("{}.json", Self::sanitize_context(context.as_str())))
    }

    /// Sanitize a context id for use as a file name.
    fn sanitize_context(context: &str) -> String {
        context
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }

    async fn read_session(path: &Path) -> Result<Session, StoreError> {
        let content = fs::read_to_string(path).await?;
        serde_json::from_str(&content)
            .map_err(|e| StoreError::Serialization(format!("Failed to deserialize session: {}", e)))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let path = self.session_path(&session.context);
        let content = serde_json::to_string_pretty(session)
            .map_err(|e| StoreError::Serialization(format!("Failed to serialize session: {}", e)))?;

        // Write then rename so a crash never leaves half a file behind.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        debug!(
            "Saved session '{}' for context '{}' ({}) to {:?}",
            session.id, session.context, session.status, path
        );
        Ok(())
    }

    async fn load(&self, context: &ContextId) -> Result<Option<Session>, StoreError> {
        let path = self.session_path(context);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        Ok(Some(Self::read_session(&path).await?))
    }

    async fn delete(&self, context: &ContextId) -> Result<(), StoreError> {
        let path = self.session_path(context);
        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
            debug!("Deleted session for context '{}'", context);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Session>, StoreError> {
        let mut sessions = Vec::new();
        let mut entries = fs::read_dir(self.sessions_dir()).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match Self::read_session(&path).await {
                Ok(session) => sessions.push(session),
                Err(e) => warn!("Skipping unreadable session file {:?}: {}", path, e),
            }
        }

        sessions.sort_by(|a, b| a.context.cmp(&b.context));
        Ok(sessions)
    }
}
