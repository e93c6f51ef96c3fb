//! Model-call seam
//!
//! The language model is opaque: it receives the ordered request context and
//! answers with one message. Any async closure can stand in for it via
//! [`model_fn`].

use crate::models::Message;
use crate::Result;
use std::future::Future;
use std::sync::Arc;

/// An opaque model call: ordered messages in, one response message out
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn respond(&self, context: &[Message]) -> Result<Message>;
}

#[async_trait::async_trait]
impl<T: ChatModel + ?Sized> ChatModel for Arc<T> {
    async fn respond(&self, context: &[Message]) -> Result<Message> {
        (**self).respond(context).await
    }
}

/// Adapter returned by [`model_fn`]
pub struct ModelFn<F> {
    f: F,
}

/// Wrap an async closure as a [`ChatModel`].
///
/// The closure receives an owned copy of the request context.
pub fn model_fn<F, Fut>(f: F) -> ModelFn<F>
where
    F: Fn(Vec<Message>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Message>> + Send + 'static,
{
    ModelFn { f }
}

#[async_trait::async_trait]
impl<F, Fut> ChatModel for ModelFn<F>
where
    F: Fn(Vec<Message>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Message>> + Send + 'static,
{
    async fn respond(&self, context: &[Message]) -> Result<Message> {
        (self.f)(context.to_vec()).await
    }
}
