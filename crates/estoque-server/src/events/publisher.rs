//! Outbound side of the event bus.

use std::sync::Arc;

use estoque_core::{DomainEvent, EventEnvelope, EventType};
use tracing::{error, info};

use super::transport::{EventTransport, TransportError};
use crate::metrics;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to encode {event_type} envelope: {source}")]
    Encode {
        event_type: EventType,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to publish {event_type}: {source}")]
    Transport {
        event_type: EventType,
        #[source]
        source: TransportError,
    },

    #[error("{service} does not publish {event_type}")]
    NotOwned {
        service: String,
        event_type: EventType,
    },
}

/// Wraps domain events in envelopes stamped with the origin service and
/// publishes them on the channel named after their type.
#[derive(Clone)]
pub struct EventPublisher {
    transport: Arc<dyn EventTransport>,
    origin: String,
}

impl EventPublisher {
    pub fn new(transport: Arc<dyn EventTransport>, origin: impl Into<String>) -> Self {
        Self {
            transport,
            origin: origin.into(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Publish one event. Returns the number of listeners reached.
    ///
    /// Transport failures are returned to the caller; nothing is retried.
    pub async fn publish(&self, event: DomainEvent) -> Result<usize, PublishError> {
        let envelope = EventEnvelope::new(event, self.origin.clone());
        self.publish_envelope(&envelope).await
    }

    /// Publish an already built envelope as is.
    pub async fn publish_envelope(&self, envelope: &EventEnvelope) -> Result<usize, PublishError> {
        let event_type = envelope.event_type();
        let message = envelope.encode().map_err(|source| PublishError::Encode {
            event_type,
            source,
        })?;

        match self
            .transport
            .publish(event_type.as_str(), message.as_bytes())
            .await
        {
            Ok(delivered) => {
                info!(
                    event_type = %event_type,
                    origin = %self.origin,
                    delivered,
                    "Event published"
                );
                metrics::record_event_published(event_type.as_str());
                Ok(delivered)
            }
            Err(source) => {
                error!(
                    event_type = %event_type,
                    origin = %self.origin,
                    error = %source,
                    "Event publish failed"
                );
                metrics::record_event_publish_failure(event_type.as_str());
                Err(PublishError::Transport { event_type, source })
            }
        }
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("origin", &self.origin)
            .field("transport", &self.transport.mode())
            .finish()
    }
}
