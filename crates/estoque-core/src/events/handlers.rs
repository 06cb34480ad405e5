//! Handler traits for inbound domain events.
//!
//! Handlers are asynchronous reactions to events received from the bus.
//! They are:
//! - **Sequential**: handlers of one event type run one after another, in
//!   registration order
//! - **Isolated**: an error or panic in one handler doesn't affect its siblings

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;

use super::types::EventEnvelope;

/// Error type for handler operations.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Handler execution failed with a message.
    #[error("Handler execution failed: {0}")]
    Execution(String),

    /// Handler failed while touching the cache store.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Handler received a payload it cannot work with.
    #[error("Unexpected payload: {0}")]
    Payload(String),

    /// Generic error with source.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    /// Create an execution error from a string.
    pub fn execution(msg: impl Into<String>) -> Self {
        HandlerError::Execution(msg.into())
    }

    /// Create a cache error from a string.
    pub fn cache(msg: impl Into<String>) -> Self {
        HandlerError::Cache(msg.into())
    }
}

/// Trait for domain event handlers.
///
/// # Example
///
/// ```ignore
/// struct ClearProducts { cache: CacheAside }
///
/// #[async_trait]
/// impl EventHandler for ClearProducts {
///     fn name(&self) -> &str { "clear_products" }
///
///     async fn handle(&self, _event: &EventEnvelope) -> Result<(), HandlerError> {
///         self.cache.invalidate_namespace(CacheNamespace::Produtos).await;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Handle one event.
    async fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError>;
}

/// Adapter turning an async closure into an `EventHandler`.
pub struct FnHandler<F, Fut> {
    name: String,
    func: F,
    _fut: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _fut: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F, Fut>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
        (self.func)(event.clone()).await
    }
}
