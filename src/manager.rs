//! Conversation history manager
//!
//! Owns per-session serialization on top of a [`HistoryStore`]. Every
//! mutating operation on a session key runs under that key's lock; sessions
//! never contend with each other.
//!
//! TURN PROTOCOL:
//! LOCK → LOAD → COMPACT? → CALL MODEL → COMMIT → UNLOCK
//!
//! Nothing is written before COMMIT, so a turn that fails, times out or is
//! dropped part-way leaves the stored history exactly as it found it.

use crate::config::HistoryConfig;
use crate::error::HistoryError;
use crate::memory::{Compactor, ConversationHistory, KeepLast, SummarizeAll, Summarizer};
use crate::models::{Message, Usage};
use crate::provider::ChatModel;
use crate::store::HistoryStore;
use crate::usage::UsageTotals;
use crate::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Result of one conversational turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// The model's reply, as appended to history
    pub response: Message,
    /// The session's full ordered history after the turn
    pub history: Vec<Message>,
    /// Whether compaction rewrote earlier history during this turn
    pub compacted: bool,
}

impl TurnOutcome {
    pub fn usage(&self) -> Option<&Usage> {
        self.response.usage()
    }
}

/// One async mutex per session key.
///
/// The table's own mutex is only held for the lookup, never across a
/// session's critical section.
#[derive(Default)]
struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(session_key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }

    /// Drop the entry when nobody holds or waits on it.
    ///
    /// Every holder and waiter owns a clone of the `Arc`, so a strong count
    /// of one means only the table refers to it.
    async fn prune(&self, session_key: &str) {
        let mut locks = self.locks.lock().await;
        if let Some(lock) = locks.get(session_key) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(session_key);
            }
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// Maintains per-session ordered message logs and mediates each turn
pub struct HistoryManager {
    store: Arc<dyn HistoryStore>,
    locks: SessionLocks,
    config: HistoryConfig,
}

impl HistoryManager {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self::with_config(store, HistoryConfig::default())
    }

    pub fn with_config(store: Arc<dyn HistoryStore>, config: HistoryConfig) -> Self {
        Self {
            store,
            locks: SessionLocks::default(),
            config,
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Add a message to the end of the session
    pub async fn append(&self, session_key: &str, message: Message) -> Result<()> {
        let _guard = self.locks.acquire(session_key).await;
        self.store.append(session_key, vec![message]).await?;
        debug!(session_key = %session_key, "Appended message");
        Ok(())
    }

    /// Full ordered history; empty for an unseen session
    pub async fn read(&self, session_key: &str) -> Result<Vec<Message>> {
        self.store.load(session_key).await
    }

    pub async fn len(&self, session_key: &str) -> Result<usize> {
        Ok(self.store.load(session_key).await?.len())
    }

    /// Keys of all sessions currently holding messages
    pub async fn sessions(&self) -> Result<Vec<String>> {
        self.store.session_keys().await
    }

    /// Discard every message of the session. Idempotent.
    pub async fn clear(&self, session_key: &str) -> Result<()> {
        let removed = {
            let _guard = self.locks.acquire(session_key).await;
            self.store.remove(session_key).await
        };
        self.locks.prune(session_key).await;
        removed?;

        info!(session_key = %session_key, "Session cleared");
        Ok(())
    }

    /// Keep only the last `keep_last` messages; a no-op when already short enough
    pub async fn truncate(&self, session_key: &str, keep_last: usize) -> Result<bool> {
        self.compact(session_key, &KeepLast::new(keep_last)).await
    }

    /// Collapse the whole session into the summarizer's single message.
    ///
    /// A no-op on an empty session. On summarizer failure the history is
    /// left unchanged and the failure is returned.
    pub async fn summarize<S>(&self, session_key: &str, summarizer: S) -> Result<bool>
    where
        S: Summarizer,
    {
        self.compact(session_key, &SummarizeAll::new(summarizer)).await
    }

    /// Apply a compaction strategy under the session lock.
    ///
    /// Returns whether the stored history changed.
    pub async fn compact(&self, session_key: &str, compactor: &dyn Compactor) -> Result<bool> {
        let _guard = self.locks.acquire(session_key).await;

        let mut history = ConversationHistory::from(self.store.load(session_key).await?);
        let before = history.len();

        if !self.run_compaction(compactor, &mut history).await? {
            return Ok(false);
        }

        let after = history.len();
        self.store
            .replace(session_key, history.into_messages())
            .await?;

        info!(session_key = %session_key, before, after, "Compacted history");
        Ok(true)
    }

    /// Run one conversational turn.
    ///
    /// Optionally compacts the current history, appends `input` to form the
    /// request context, asks `model` for a response and commits the request
    /// and response together.
    pub async fn run_turn(
        &self,
        session_key: &str,
        input: Message,
        model: &dyn ChatModel,
        compactor: Option<&dyn Compactor>,
    ) -> Result<TurnOutcome> {
        let _guard = self.locks.acquire(session_key).await;

        let mut history = ConversationHistory::from(self.store.load(session_key).await?);

        let compacted = match compactor {
            Some(compactor) => self.run_compaction(compactor, &mut history).await?,
            None => false,
        };

        let mut context = history.into_messages();
        context.push(input.clone());

        debug!(
            session_key = %session_key,
            context_len = context.len(),
            compacted,
            "Calling model"
        );

        let response = self.call_model(model, &context).await?;

        context.push(response.clone());
        if compacted {
            self.store.replace(session_key, context.clone()).await?;
        } else {
            self.store
                .append(session_key, vec![input, response.clone()])
                .await?;
        }

        info!(
            session_key = %session_key,
            history_len = context.len(),
            compacted,
            "Turn completed"
        );

        Ok(TurnOutcome {
            response,
            history: context,
            compacted,
        })
    }

    /// Usage summed over the messages currently stored for the session
    pub async fn usage(&self, session_key: &str) -> Result<UsageTotals> {
        let messages = self.store.load(session_key).await?;
        Ok(UsageTotals::from_messages(&messages))
    }

    async fn run_compaction(
        &self,
        compactor: &dyn Compactor,
        history: &mut ConversationHistory,
    ) -> Result<bool> {
        let staged = history.clone();
        let result = with_timeout(self.config.summarize_timeout, compactor.compact(history)).await;

        match result {
            Some(Ok(changed)) => Ok(changed),
            Some(Err(e)) => {
                *history = staged;
                Err(e)
            }
            None => {
                *history = staged;
                warn!("Compaction timed out");
                Err(HistoryError::SummarizationFailure(format!(
                    "Compaction timed out after {:?}",
                    self.config.summarize_timeout.unwrap_or_default()
                )))
            }
        }
    }

    async fn call_model(&self, model: &dyn ChatModel, context: &[Message]) -> Result<Message> {
        match with_timeout(self.config.turn_timeout, model.respond(context)).await {
            Some(result) => result.map_err(|e| {
                warn!("Model call failed: {}", e);
                e.into_provider()
            }),
            None => {
                warn!("Model call timed out");
                Err(HistoryError::ProviderFailure(format!(
                    "Model call timed out after {:?}",
                    self.config.turn_timeout.unwrap_or_default()
                )))
            }
        }
    }
}

/// `None` when the limit elapsed first
async fn with_timeout<F: Future>(limit: Option<Duration>, future: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await.ok(),
        None => Some(future.await),
    }
}
