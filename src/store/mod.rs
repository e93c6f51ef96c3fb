//! History persistence layer
//!
//! Sessions are keyed by an opaque string. Every write is atomic: readers
//! observe a session either before or after a write, never halfway.
//! Uses in-memory storage by default; Postgres when a database is configured.

pub mod postgres;

pub use postgres::PostgresHistoryStore;

use crate::config::HistoryConfig;
use crate::models::Message;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Trait for history persistence
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// Full ordered sequence for a session; empty for unseen keys
    async fn load(&self, session_key: &str) -> Result<Vec<Message>>;

    /// Atomically replace the whole sequence
    async fn replace(&self, session_key: &str, messages: Vec<Message>) -> Result<()>;

    /// Atomically append `messages`, in order, to the end of the sequence
    async fn append(&self, session_key: &str, messages: Vec<Message>) -> Result<()>;

    /// Discard the session entirely
    async fn remove(&self, session_key: &str) -> Result<()>;

    /// Keys of all non-empty sessions
    async fn session_keys(&self) -> Result<Vec<String>>;
}

/// In-memory history store for development and tests
pub struct InMemoryHistoryStore {
    sessions: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn load(&self, session_key: &str) -> Result<Vec<Message>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_key).cloned().unwrap_or_default())
    }

    async fn replace(&self, session_key: &str, messages: Vec<Message>) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if messages.is_empty() {
            sessions.remove(session_key);
        } else {
            sessions.insert(session_key.to_string(), messages);
        }
        Ok(())
    }

    async fn append(&self, session_key: &str, messages: Vec<Message>) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_key.to_string())
            .or_insert_with(Vec::new)
            .extend(messages);
        Ok(())
    }

    async fn remove(&self, session_key: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_key);
        Ok(())
    }

    async fn session_keys(&self) -> Result<Vec<String>> {
        let sessions = self.sessions.read().await;
        let mut keys: Vec<String> = sessions.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// Pick a backend from configuration.
///
/// Falls back to in-memory storage when the Postgres pool cannot be built.
pub fn build_store(config: &HistoryConfig) -> Arc<dyn HistoryStore> {
    if let Some(url) = config.database_url.as_deref() {
        match PostgresHistoryStore::connect_lazy(url, config.max_connections) {
            Ok(store) => {
                info!("History store backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres history store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("History store backend: in-memory");
    Arc::new(InMemoryHistoryStore::new())
}
