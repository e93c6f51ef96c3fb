//! Conversation History Manager
//!
//! Per-session conversation memory for LLM-backed agents:
//! - Keeps an ordered message log per session key
//! - Compacts history by truncation or summarization
//! - Serializes each read-modify-append turn around an opaque model call
//! - Persists to memory or Postgres behind one storage trait
//!
//! TURN PROTOCOL:
//! LOCK → LOAD → COMPACT? → CALL MODEL → COMMIT → UNLOCK

pub mod config;
pub mod error;
pub mod manager;
pub mod memory;
pub mod models;
pub mod provider;
pub mod store;
pub mod usage;

pub use error::{HistoryError, Result};

// Re-export common types
pub use config::HistoryConfig;
pub use manager::{HistoryManager, TurnOutcome};
pub use memory::{
    compactor_fn, summarizer_fn, Compactor, ContextConfig, KeepLast, SummarizeAll, Summarizer,
    TokenBudget,
};
pub use models::*;
pub use provider::{model_fn, ChatModel};
pub use store::{HistoryStore, InMemoryHistoryStore, PostgresHistoryStore};
pub use usage::UsageTotals;
