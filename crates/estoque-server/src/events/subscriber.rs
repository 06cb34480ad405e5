//! Inbound side of the event bus.
//!
//! A subscriber goes through two states:
//!
//! - `SubscriberBuilder` (unsubscribed): handlers are registered per type
//! - `ActiveSubscription` (subscribed): a background task reads the channel
//!   stream and dispatches every envelope through the handler registry
//!
//! Registration is closed once `subscribe` consumes the builder.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use estoque_core::events::{FnHandler, HandlerError};
use estoque_core::{EventEnvelope, EventHandler, EventType, HandlerRegistry};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::transport::{EventTransport, MessageStream, TransportError, TransportMessage};
use crate::metrics;

#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("no event types to subscribe to")]
    NoEventTypes,

    #[error("failed to subscribe: {0}")]
    Transport(#[from] TransportError),
}

/// Backoff used to re-listen after the channel stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(300),
        }
    }
}

/// Unsubscribed subscriber collecting handlers.
pub struct SubscriberBuilder {
    transport: Arc<dyn EventTransport>,
    registry: HandlerRegistry,
    reconnect: ReconnectPolicy,
}

impl SubscriberBuilder {
    pub fn new(transport: Arc<dyn EventTransport>) -> Self {
        Self {
            transport,
            registry: HandlerRegistry::new(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Bound every handler invocation by `timeout`.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.registry.set_timeout(timeout);
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Append `handler` to the handlers of `event_type`.
    pub fn on(mut self, event_type: EventType, handler: Arc<dyn EventHandler>) -> Self {
        self.registry.register(event_type, handler);
        self
    }

    /// Register an async closure as a handler.
    pub fn on_fn<F, Fut>(self, event_type: EventType, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.on(event_type, Arc::new(FnHandler::new(name, func)))
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Start listening on the channels of `event_types`.
    ///
    /// An initial listen failure is returned; later stream loss is handled
    /// by the background task.
    pub async fn subscribe(
        self,
        event_types: &[EventType],
    ) -> Result<ActiveSubscription, SubscribeError> {
        let mut types: Vec<EventType> = Vec::with_capacity(event_types.len());
        for event_type in event_types {
            if !types.contains(event_type) {
                types.push(*event_type);
            }
        }
        if types.is_empty() {
            return Err(SubscribeError::NoEventTypes);
        }

        let channels: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
        let stream = self.transport.listen(&channels).await?;

        info!(
            transport = self.transport.mode(),
            channels = ?channels,
            "Subscribed to event channels"
        );

        let cancel = CancellationToken::new();
        let listener = Listener {
            transport: self.transport,
            registry: Arc::new(self.registry),
            channels,
            reconnect: self.reconnect,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(listener.run(stream));

        Ok(ActiveSubscription {
            event_types: types,
            cancel,
            task: Some(task),
        })
    }
}

impl std::fmt::Debug for SubscriberBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberBuilder")
            .field("transport", &self.transport.mode())
            .field("registry", &self.registry)
            .finish()
    }
}

/// A running subscription. Dropping it stops the listener.
pub struct ActiveSubscription {
    event_types: Vec<EventType>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ActiveSubscription {
    pub fn event_types(&self) -> &[EventType] {
        &self.event_types
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop listening. A handler already running is allowed to finish.
    /// Calling this more than once is a no-op.
    pub async fn unsubscribe(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        self.cancel.cancel();
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                error!(error = %e, "Event listener task failed");
            }
        }

        info!(event_types = self.event_types.len(), "Unsubscribed from event channels");
    }
}

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for ActiveSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSubscription")
            .field("event_types", &self.event_types)
            .field("active", &self.is_active())
            .finish()
    }
}

// ============================================================================
// Background listener
// ============================================================================

struct Listener {
    transport: Arc<dyn EventTransport>,
    registry: Arc<HandlerRegistry>,
    channels: Vec<String>,
    reconnect: ReconnectPolicy,
    cancel: CancellationToken,
}

impl Listener {
    async fn run(self, mut stream: MessageStream) {
        loop {
            loop {
                let next = tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    next = stream.next() => next,
                };
                match next {
                    Some(message) => self.handle_message(message).await,
                    None => break,
                }
            }

            error!(channels = ?self.channels, "Event stream ended, resubscribing");
            match self.relisten().await {
                Some(fresh) => stream = fresh,
                None => return,
            }
        }
    }

    /// Re-open the channel stream with exponential backoff. Returns `None`
    /// when cancelled first.
    async fn relisten(&self) -> Option<MessageStream> {
        let mut backoff = self.reconnect.initial;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(backoff) => {}
            }

            match self.transport.listen(&self.channels).await {
                Ok(stream) => {
                    info!(channels = ?self.channels, "Resubscribed to event channels");
                    return Some(stream);
                }
                Err(e) => {
                    error!(
                        error = %e,
                        backoff_secs = backoff.as_secs(),
                        "Resubscribe failed, retrying"
                    );
                    backoff = (backoff * 2).min(self.reconnect.max);
                }
            }
        }
    }

    async fn handle_message(&self, message: TransportMessage) {
        let envelope = match EventEnvelope::decode(&message.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    channel = %message.channel,
                    error = %e,
                    "Dropping malformed event message"
                );
                metrics::record_event_malformed();
                return;
            }
        };

        let event_type = envelope.event_type();
        if event_type.as_str() != message.channel {
            warn!(
                channel = %message.channel,
                event_type = %event_type,
                "Dropping event received on a foreign channel"
            );
            metrics::record_event_malformed();
            return;
        }

        debug!(
            event_type = %event_type,
            origin = %envelope.origin_service,
            "Event received"
        );
        metrics::record_event_received(event_type.as_str());

        let report = self.registry.dispatch(&envelope).await;
        if report.failed > 0 {
            metrics::record_handler_failures(event_type.as_str(), report.failed);
        }
    }
}
