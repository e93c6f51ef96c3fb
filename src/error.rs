//! Error types for the conversation history manager

use thiserror::Error;

/// Result type alias for history operations
pub type Result<T> = std::result::Result<T, HistoryError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {

    // =============================
    // Collaborator Failures
    // =============================

    /// The history store is unreachable or returned corrupt data
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// The opaque model call errored or timed out
    #[error("Provider failure: {0}")]
    ProviderFailure(String),

    /// The opaque summarizer call errored or timed out
    #[error("Summarization failure: {0}")]
    SummarizationFailure(String),

    // =============================
    // Setup
    // =============================

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl HistoryError {
    /// Re-tag an error raised inside a model call as a provider failure.
    pub(crate) fn into_provider(self) -> Self {
        match self {
            e @ HistoryError::ProviderFailure(_) => e,
            other => HistoryError::ProviderFailure(other.to_string()),
        }
    }

    /// Re-tag an error raised inside a summarizer call as a summarization failure.
    pub(crate) fn into_summarization(self) -> Self {
        match self {
            e @ HistoryError::SummarizationFailure(_) => e,
            other => HistoryError::SummarizationFailure(other.to_string()),
        }
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, HistoryError::StorageFailure(_))
    }
}
