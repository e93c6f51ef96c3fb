//! Context Window Management
//!
//! Compaction strategies applied to a session's history before a turn:
//! plain truncation, whole-history summarization, and a token budget that
//! summarizes the oldest prefix once the context window fills up.

use crate::error::HistoryError;
use crate::memory::history::ConversationHistory;
use crate::memory::summarizer::Summarizer;
use crate::models::Message;
use crate::Result;
use std::future::Future;
use tracing::{debug, info};

/// A compaction strategy.
///
/// Returns whether the history was changed. Implementations must leave
/// `history` untouched when they return an error.
#[async_trait::async_trait]
pub trait Compactor: Send + Sync {
    async fn compact(&self, history: &mut ConversationHistory) -> Result<bool>;
}

/// Adapter returned by [`compactor_fn`]
pub struct CompactorFn<F> {
    f: F,
}

/// Wrap an async closure as a [`Compactor`].
///
/// The closure receives an owned copy of the history and returns the
/// compacted sequence. The result must be a suffix of the input, optionally
/// preceded by one message standing in for the dropped prefix; anything else
/// is rejected and the history is left untouched.
pub fn compactor_fn<F, Fut>(f: F) -> CompactorFn<F>
where
    F: Fn(Vec<Message>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Message>>> + Send + 'static,
{
    CompactorFn { f }
}

/// Whether `compacted` only drops or collapses a leading prefix of `original`
fn is_prefix_compaction(original: &[Message], compacted: &[Message]) -> bool {
    if original.ends_with(compacted) {
        return true;
    }

    !compacted.is_empty()
        && compacted.len() <= original.len()
        && original.ends_with(&compacted[1..])
}

#[async_trait::async_trait]
impl<F, Fut> Compactor for CompactorFn<F>
where
    F: Fn(Vec<Message>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Message>>> + Send + 'static,
{
    async fn compact(&self, history: &mut ConversationHistory) -> Result<bool> {
        let compacted = (self.f)(history.messages().to_vec())
            .await
            .map_err(|e| e.into_summarization())?;

        if compacted.as_slice() == history.messages() {
            return Ok(false);
        }

        if !is_prefix_compaction(history.messages(), &compacted) {
            return Err(HistoryError::SummarizationFailure(
                "Compaction may only drop or collapse the oldest messages".to_string(),
            ));
        }

        *history = ConversationHistory::from(compacted);
        Ok(true)
    }
}

/// Keep only the most recent messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepLast {
    pub keep_last: usize,
}

impl KeepLast {
    pub fn new(keep_last: usize) -> Self {
        Self { keep_last }
    }
}

#[async_trait::async_trait]
impl Compactor for KeepLast {
    async fn compact(&self, history: &mut ConversationHistory) -> Result<bool> {
        let before = history.len();
        let changed = history.keep_last(self.keep_last);
        if changed {
            debug!(before, after = history.len(), "Truncated history");
        }
        Ok(changed)
    }
}

/// Collapse the entire history into a single summary message
pub struct SummarizeAll<S> {
    summarizer: S,
}

impl<S: Summarizer> SummarizeAll<S> {
    pub fn new(summarizer: S) -> Self {
        Self { summarizer }
    }
}

#[async_trait::async_trait]
impl<S: Summarizer> Compactor for SummarizeAll<S> {
    async fn compact(&self, history: &mut ConversationHistory) -> Result<bool> {
        if history.is_empty() {
            return Ok(false);
        }

        let summary = self
            .summarizer
            .summarize(history.messages())
            .await
            .map_err(|e| e.into_summarization())?;

        let collapsed = history.len();
        history.collapse_prefix(collapsed, summary);
        info!(collapsed, "Summarized entire history");
        Ok(true)
    }
}

/// Configuration for context window management
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Maximum tokens before triggering summarization
    pub max_context_tokens: usize,
    /// Threshold percentage to trigger summarization (e.g., 80%)
    pub summarization_threshold: f32,
    /// Minimum messages to keep before summarization
    pub min_messages_to_keep: usize,
    /// Number of recent messages to always preserve
    pub preserve_recent_count: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 100_000,
            summarization_threshold: 0.8,
            min_messages_to_keep: 5,
            preserve_recent_count: 10,
        }
    }
}

/// Summarizes the oldest messages once the token budget is nearly spent
pub struct TokenBudget<S> {
    summarizer: S,
    config: ContextConfig,
}

impl<S: Summarizer> TokenBudget<S> {
    pub fn new(summarizer: S, config: ContextConfig) -> Self {
        Self { summarizer, config }
    }

    fn threshold_tokens(&self) -> usize {
        (self.config.max_context_tokens as f32 * self.config.summarization_threshold) as usize
    }

    /// Check if context window is getting full
    pub fn should_summarize(&self, history: &ConversationHistory) -> bool {
        let current_tokens = history.total_tokens();
        let threshold_tokens = self.threshold_tokens();

        let should = current_tokens >= threshold_tokens
            && history.len() > self.config.min_messages_to_keep
            && self.archive_count(history) > 0;

        if should {
            info!(
                "Context window at {}/{} tokens (threshold: {}). Summarization needed.",
                current_tokens, self.config.max_context_tokens, threshold_tokens
            );
        }

        should
    }

    /// Get percentage of context window used
    pub fn get_context_usage_percent(&self, history: &ConversationHistory) -> f32 {
        (history.total_tokens() as f32 / self.config.max_context_tokens as f32) * 100.0
    }

    /// Number of leading messages that would be folded into the summary
    fn archive_count(&self, history: &ConversationHistory) -> usize {
        history.len().saturating_sub(self.config.preserve_recent_count)
    }

    /// Estimate if summarization is needed
    pub fn estimate_need_for_summary(&self, history: &ConversationHistory) -> SummarizationNeeds {
        let archive_count = self.archive_count(history);

        SummarizationNeeds {
            should_summarize: self.should_summarize(history),
            percent_used: self.get_context_usage_percent(history),
            current_tokens: history.total_tokens(),
            messages_to_archive_count: archive_count,
            tokens_to_save_estimate: history.messages()[..archive_count]
                .iter()
                .map(|m| m.token_count())
                .sum(),
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl<S: Summarizer> Compactor for TokenBudget<S> {
    async fn compact(&self, history: &mut ConversationHistory) -> Result<bool> {
        let needs = self.estimate_need_for_summary(history);
        if !needs.should_summarize {
            return Ok(false);
        }

        info!(
            "Context at {}% - Summarizing {} old messages to save ~{} tokens",
            needs.percent_used as u32, needs.messages_to_archive_count, needs.tokens_to_save_estimate
        );

        let archive = &history.messages()[..needs.messages_to_archive_count];
        let summary = self
            .summarizer
            .summarize(archive)
            .await
            .map_err(|e| e.into_summarization())?;

        history.collapse_prefix(needs.messages_to_archive_count, summary);
        Ok(true)
    }
}

/// Information about summarization needs
#[derive(Debug, Clone)]
pub struct SummarizationNeeds {
    pub should_summarize: bool,
    pub percent_used: f32,
    pub current_tokens: usize,
    pub messages_to_archive_count: usize,
    pub tokens_to_save_estimate: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::summarizer::summarizer_fn;

    fn counting_summarizer() -> impl Summarizer {
        summarizer_fn(|messages: Vec<Message>| async move {
            Ok(Message::summary(format!("{} earlier messages", messages.len())))
        })
    }

    fn failing_summarizer() -> impl Summarizer {
        summarizer_fn(|_messages: Vec<Message>| async {
            Err(HistoryError::ProviderFailure("model offline".to_string()))
        })
    }

    fn long_history(count: usize) -> ConversationHistory {
        let mut history = ConversationHistory::new();
        for i in 0..count {
            history.push(Message::user(format!("Question {}. ", i).repeat(20)));
        }
        history
    }

    fn small_budget() -> ContextConfig {
        ContextConfig {
            max_context_tokens: 1000,
            summarization_threshold: 0.8,
            min_messages_to_keep: 2,
            preserve_recent_count: 3,
        }
    }

    #[tokio::test]
    async fn test_keep_last() {
        let mut history = long_history(6);
        assert!(KeepLast::new(2).compact(&mut history).await.unwrap());
        assert_eq!(history.len(), 2);
        assert!(!KeepLast::new(2).compact(&mut history).await.unwrap());
    }

    #[tokio::test]
    async fn test_summarize_all_collapses_to_one() {
        let mut history = long_history(4);
        let changed = SummarizeAll::new(counting_summarizer())
            .compact(&mut history)
            .await
            .unwrap();

        assert!(changed);
        assert_eq!(history.len(), 1);
        assert_eq!(history.messages()[0].content(), "4 earlier messages");
    }

    #[tokio::test]
    async fn test_summarize_all_noop_on_empty() {
        let mut history = ConversationHistory::new();
        let changed = SummarizeAll::new(failing_summarizer())
            .compact(&mut history)
            .await
            .unwrap();
        assert!(!changed);
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_summarize_failure_leaves_history() {
        let mut history = long_history(4);
        let before = history.clone();

        let err = SummarizeAll::new(failing_summarizer())
            .compact(&mut history)
            .await
            .unwrap_err();

        assert!(matches!(err, HistoryError::SummarizationFailure(_)));
        assert_eq!(history, before);
    }

    #[test]
    fn test_should_summarize() {
        let budget = TokenBudget::new(counting_summarizer(), small_budget());
        let history = long_history(50);
        assert!(budget.should_summarize(&history));

        let short = long_history(2);
        assert!(!budget.should_summarize(&short));
    }

    #[tokio::test]
    async fn test_token_budget_preserves_recent() {
        let budget = TokenBudget::new(counting_summarizer(), small_budget());
        let mut history = long_history(50);
        let recent: Vec<Message> = history.recent_messages(3).cloned().collect();

        assert!(budget.compact(&mut history).await.unwrap());
        assert_eq!(history.len(), 4);
        assert!(history.messages()[0].is_summary());
        assert_eq!(history.messages()[0].content(), "47 earlier messages");
        assert_eq!(&history.messages()[1..], recent.as_slice());
    }

    #[tokio::test]
    async fn test_token_budget_under_threshold_is_noop() {
        let budget = TokenBudget::new(failing_summarizer(), ContextConfig::default());
        let mut history = long_history(20);
        assert!(!budget.compact(&mut history).await.unwrap());
        assert_eq!(history.len(), 20);
    }

    #[test]
    fn test_estimate_need_for_summary() {
        let budget = TokenBudget::new(counting_summarizer(), small_budget());
        let history = long_history(10);
        let needs = budget.estimate_need_for_summary(&history);

        assert_eq!(needs.messages_to_archive_count, 7);
        assert_eq!(needs.current_tokens, history.total_tokens());
        assert!(needs.tokens_to_save_estimate < needs.current_tokens);
        assert!(needs.percent_used > 0.0);
    }

    #[tokio::test]
    async fn test_compactor_fn_drops_oldest() {
        let mut history = long_history(5);
        let expected: Vec<Message> = history.recent_messages(2).cloned().collect();

        let compactor = compactor_fn(|messages: Vec<Message>| async move {
            Ok(messages[messages.len() - 2..].to_vec())
        });

        assert!(compactor.compact(&mut history).await.unwrap());
        assert_eq!(history.messages(), expected.as_slice());
        assert_eq!(
            history.total_tokens(),
            expected.iter().map(|m| m.token_count()).sum::<usize>()
        );
    }

    #[tokio::test]
    async fn test_compactor_fn_collapses_prefix() {
        let mut history = long_history(5);

        let compactor = compactor_fn(|messages: Vec<Message>| async move {
            let mut compacted = vec![Message::summary("first three")];
            compacted.extend_from_slice(&messages[3..]);
            Ok(compacted)
        });

        assert!(compactor.compact(&mut history).await.unwrap());
        assert_eq!(history.len(), 3);
        assert!(history.messages()[0].is_summary());
    }

    #[tokio::test]
    async fn test_compactor_fn_unchanged_is_noop() {
        let mut history = long_history(3);
        let compactor = compactor_fn(|messages: Vec<Message>| async move { Ok(messages) });
        assert!(!compactor.compact(&mut history).await.unwrap());
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn test_compactor_fn_rejects_reordering() {
        let mut history = long_history(4);
        let before = history.clone();

        let compactor = compactor_fn(|mut messages: Vec<Message>| async move {
            messages.reverse();
            Ok(messages)
        });

        let err = compactor.compact(&mut history).await.unwrap_err();
        assert!(matches!(err, HistoryError::SummarizationFailure(_)));
        assert_eq!(history, before);
    }

    #[tokio::test]
    async fn test_compactor_fn_error_is_summarization_failure() {
        let mut history = long_history(2);
        let before = history.clone();
        let compactor = compactor_fn(|_messages: Vec<Message>| async {
            Err(HistoryError::ProviderFailure("model offline".to_string()))
        });

        let err = compactor.compact(&mut history).await.unwrap_err();
        assert!(matches!(err, HistoryError::SummarizationFailure(_)));
        assert_eq!(history, before);
    }
}
