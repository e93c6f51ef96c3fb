//! Conversation history working copy
//!
//! An ordered sequence of messages plus the bookkeeping compaction needs.
//! Order is never changed: only a contiguous prefix can be dropped or
//! collapsed into a single synthetic message.

use crate::models::{Message, Role};

/// Ordered messages of one session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationHistory {
    messages: Vec<Message>,
    /// Total token count (approximate)
    total_tokens: usize,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message to history
    pub fn push(&mut self, message: Message) {
        self.total_tokens += message.token_count();
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Iterate over the `count` most recent messages, oldest first
    pub fn recent_messages(&self, count: usize) -> impl Iterator<Item = &Message> {
        let start = self.messages.len().saturating_sub(count);
        self.messages[start..].iter()
    }

    /// Get total token count
    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    /// Get message count
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Recompute token count (prevents drift)
    fn recompute_total_tokens(&mut self) {
        self.total_tokens = self.messages.iter().map(|m| m.token_count()).sum();
    }

    /// Drop the oldest messages so that at most `keep_last` remain.
    ///
    /// Returns whether anything was dropped.
    pub fn keep_last(&mut self, keep_last: usize) -> bool {
        if self.messages.len() <= keep_last {
            return false;
        }

        let drop_count = self.messages.len() - keep_last;
        self.messages.drain(..drop_count);
        self.recompute_total_tokens();
        true
    }

    /// Replace the first `prefix_len` messages with `summary`.
    ///
    /// `prefix_len` is clamped to the history length, so collapsing the
    /// whole history leaves exactly one message.
    pub fn collapse_prefix(&mut self, prefix_len: usize, summary: Message) {
        let prefix_len = prefix_len.min(self.messages.len());
        self.messages.splice(..prefix_len, std::iter::once(summary));
        self.recompute_total_tokens();
    }

    /// Get formatted conversation, one `Role: content` line per message
    pub fn formatted_transcript(&self) -> String {
        format_transcript(&self.messages)
    }
}

impl From<Vec<Message>> for ConversationHistory {
    fn from(messages: Vec<Message>) -> Self {
        let total_tokens = messages.iter().map(|m| m.token_count()).sum();
        Self {
            messages,
            total_tokens,
        }
    }
}

/// Format messages into readable text for prompts and summaries
pub fn format_transcript(messages: &[Message]) -> String {
    let mut text = String::new();

    for msg in messages {
        if msg.is_summary() {
            text.push_str("[Summary] ");
        }

        match msg.role() {
            Role::Tool => {
                let call_id = msg.metadata().tool_call_id.as_deref().unwrap_or("?");
                text.push_str(&format!("Tool ({}): {}\n", call_id, msg.content()));
            }
            role => text.push_str(&format!("{}: {}\n", role, msg.content())),
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(count: usize) -> ConversationHistory {
        let mut history = ConversationHistory::new();
        for i in 0..count {
            history.push(Message::user(format!("Question {}", i)));
        }
        history
    }

    #[test]
    fn test_conversation_history() {
        let mut history = ConversationHistory::new();
        history.push(Message::user("What is RSI?"));
        history.push(Message::assistant("RSI is a momentum oscillator..."));

        assert_eq!(history.len(), 2);
        assert!(history.total_tokens() > 0);
    }

    #[test]
    fn test_keep_last_drops_oldest_prefix() {
        let mut history = numbered(10);
        assert!(history.keep_last(3));

        let contents: Vec<_> = history.messages().iter().map(|m| m.content()).collect();
        assert_eq!(contents, vec!["Question 7", "Question 8", "Question 9"]);
        assert_eq!(
            history.total_tokens(),
            history.messages().iter().map(|m| m.token_count()).sum::<usize>()
        );
    }

    #[test]
    fn test_keep_last_noop_when_short_enough() {
        let mut history = numbered(3);
        let before = history.clone();
        assert!(!history.keep_last(3));
        assert!(!history.keep_last(5));
        assert_eq!(history, before);
    }

    #[test]
    fn test_keep_last_zero_empties() {
        let mut history = numbered(4);
        assert!(history.keep_last(0));
        assert!(history.is_empty());
        assert_eq!(history.total_tokens(), 0);
    }

    #[test]
    fn test_collapse_prefix() {
        let mut history = numbered(5);
        history.collapse_prefix(3, Message::summary("Questions 0 to 2"));

        assert_eq!(history.len(), 3);
        assert!(history.messages()[0].is_summary());
        assert_eq!(history.messages()[1].content(), "Question 3");
        assert_eq!(history.messages()[2].content(), "Question 4");
    }

    #[test]
    fn test_collapse_whole_history() {
        let mut history = numbered(4);
        history.collapse_prefix(usize::MAX, Message::summary("everything"));
        assert_eq!(history.len(), 1);
        assert_eq!(history.messages()[0].content(), "everything");
    }

    #[test]
    fn test_recent_messages_oldest_first() {
        let history = numbered(5);
        let recent: Vec<_> = history.recent_messages(2).map(|m| m.content()).collect();
        assert_eq!(recent, vec!["Question 3", "Question 4"]);
        assert_eq!(history.recent_messages(50).count(), 5);
    }

    #[test]
    fn test_formatted_transcript() {
        let mut history = ConversationHistory::new();
        history.push(Message::summary("Earlier: greetings"));
        history.push(Message::user("What is 3 * 12?"));
        history.push(Message::tool("call_1", "36"));
        history.push(Message::assistant("It is 36."));

        let text = history.formatted_transcript();
        assert!(text.contains("[Summary] System: Earlier: greetings"));
        assert!(text.contains("User: What is 3 * 12?"));
        assert!(text.contains("Tool (call_1): 36"));
        assert!(text.contains("Assistant: It is 36."));
    }
}
