//! Conversation Memory
//!
//! Working copy of a session's history, the summarizer seam, and the
//! compaction strategies applied before a turn

pub mod context_manager;
pub mod history;
pub mod summarizer;

pub use context_manager::{
    compactor_fn, Compactor, CompactorFn, ContextConfig, KeepLast, SummarizationNeeds,
    SummarizeAll, TokenBudget,
};
pub use history::{format_transcript, ConversationHistory};
pub use summarizer::{summarizer_fn, Summarizer, SummarizerFn, TranscriptSummarizer};
