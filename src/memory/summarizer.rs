//! Context Summarization
//!
//! Collapses a run of messages into one synthetic summary message, either
//! through a caller-supplied closure or by asking a chat model.

use crate::error::HistoryError;
use crate::memory::history::format_transcript;
use crate::models::Message;
use crate::provider::ChatModel;
use crate::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// An opaque summarizer call: ordered messages in, one synthetic message out
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<Message>;
}

#[async_trait::async_trait]
impl<T: Summarizer + ?Sized> Summarizer for Arc<T> {
    async fn summarize(&self, messages: &[Message]) -> Result<Message> {
        (**self).summarize(messages).await
    }
}

/// Adapter returned by [`summarizer_fn`]
pub struct SummarizerFn<F> {
    f: F,
}

/// Wrap an async closure as a [`Summarizer`]
pub fn summarizer_fn<F, Fut>(f: F) -> SummarizerFn<F>
where
    F: Fn(Vec<Message>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Message>> + Send + 'static,
{
    SummarizerFn { f }
}

#[async_trait::async_trait]
impl<F, Fut> Summarizer for SummarizerFn<F>
where
    F: Fn(Vec<Message>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Message>> + Send + 'static,
{
    async fn summarize(&self, messages: &[Message]) -> Result<Message> {
        (self.f)(messages.to_vec()).await
    }
}

const DEFAULT_INSTRUCTIONS: &str = r#"You are summarizing a conversation so it can continue within a smaller context.

Keep:
1. Facts the user stated about themselves
2. Questions asked and the answers given
3. Decisions, conclusions and open tasks
4. Tool results that later turns relied on

Be concise. Write plain sentences, no preamble."#;

/// Summarizes a transcript by asking a chat model
pub struct TranscriptSummarizer<M> {
    model: M,
    instructions: String,
}

impl<M: ChatModel> TranscriptSummarizer<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }

    pub fn with_instructions(model: M, instructions: impl Into<String>) -> Self {
        Self {
            model,
            instructions: instructions.into(),
        }
    }

    fn build_request(&self, messages: &[Message]) -> Vec<Message> {
        let prompt = format!(
            "CONVERSATION:\n---\n{}---\n\nSUMMARY:",
            format_transcript(messages)
        );

        vec![
            Message::system(self.instructions.clone()),
            Message::user(prompt),
        ]
    }
}

#[async_trait::async_trait]
impl<M: ChatModel> Summarizer for TranscriptSummarizer<M> {
    async fn summarize(&self, messages: &[Message]) -> Result<Message> {
        if messages.is_empty() {
            return Err(HistoryError::SummarizationFailure(
                "Cannot summarize empty message list".to_string(),
            ));
        }

        info!("Summarizing {} messages", messages.len());

        let request = self.build_request(messages);
        let reply = match self.model.respond(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Failed to summarize context: {}", e);
                return Err(e.into_summarization());
            }
        };

        let mut summary = Message::summary(reply.content());
        if let Some(usage) = reply.usage() {
            summary = summary.with_usage(*usage);
        }

        Ok(summary)
    }
}
