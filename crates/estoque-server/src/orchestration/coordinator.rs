//! Per-service consistency coordinator.

use async_trait::async_trait;
use estoque_core::{
    CacheNamespace, DomainEvent, EventEnvelope, EventHandler, EventType, HandlerError,
};
use std::sync::Arc;
use tracing::{debug, info};

use super::rules::{Invalidation, ReadAction, read_rules, write_invalidations};
use super::service::Service;
use crate::cache::CacheAside;
use crate::events::{EventPublisher, PublishError, SubscriberBuilder};

/// Applies one service's write-side and read-side consistency rules.
#[derive(Clone, Debug)]
pub struct Coordinator {
    service: Service,
    cache: CacheAside,
    publisher: EventPublisher,
}

impl Coordinator {
    pub fn new(service: Service, cache: CacheAside, publisher: EventPublisher) -> Self {
        Self {
            service,
            cache,
            publisher,
        }
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn cache(&self) -> &CacheAside {
        &self.cache
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Run after a mutation has committed: clear this service's cache
    /// entries for the entity, then publish the event.
    ///
    /// Cache failures are absorbed. A publish failure is returned; the write
    /// is already durable, so callers usually log it and continue.
    pub async fn after_commit(&self, event: DomainEvent) -> Result<usize, PublishError> {
        let event_type = event.event_type();
        if !self.service.owns(event_type) {
            return Err(PublishError::NotOwned {
                service: self.service.name().to_string(),
                event_type,
            });
        }

        for invalidation in write_invalidations(self.service, &event) {
            match invalidation {
                Invalidation::Namespace(namespace) => {
                    self.cache.invalidate_namespace(namespace).await;
                }
                Invalidation::Key(namespace, key) => {
                    self.cache.invalidate(namespace, &key).await;
                }
            }
        }
        debug!(service = %self.service, event_type = %event_type, "Own cache invalidated");

        self.publisher.publish(event).await
    }

    /// Event types this service subscribes to.
    pub fn subscribed_types(&self) -> Vec<EventType> {
        read_rules(self.service)
            .into_iter()
            .map(|(event_type, _)| event_type)
            .collect()
    }

    /// Register this service's reactions on `builder`.
    pub fn subscriber(&self, mut builder: SubscriberBuilder) -> SubscriberBuilder {
        for (event_type, action) in read_rules(self.service) {
            let handler: Arc<dyn EventHandler> = match action {
                ReadAction::ClearNamespace(namespace) => Arc::new(InvalidateNamespace {
                    name: format!("{}:clear-{}", self.service.as_str(), namespace),
                    cache: self.cache.clone(),
                    namespace,
                }),
                ReadAction::AuditLog => Arc::new(AuditLog {
                    name: format!("{}:audit", self.service.as_str()),
                    service: self.service,
                }),
            };
            builder = builder.on(event_type, handler);
        }
        builder
    }
}

/// Clears a whole namespace whenever an event arrives.
pub struct InvalidateNamespace {
    name: String,
    cache: CacheAside,
    namespace: CacheNamespace,
}

#[async_trait]
impl EventHandler for InvalidateNamespace {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
        let removed = self.cache.invalidate_namespace(self.namespace).await;
        info!(
            namespace = %self.namespace,
            event_type = %event.event_type(),
            origin = %event.origin_service,
            removed,
            "Cache namespace cleared by event"
        );
        Ok(())
    }
}

/// Records login activity in the log. No cache effect.
pub struct AuditLog {
    name: String,
    service: Service,
}

#[async_trait]
impl EventHandler for AuditLog {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
        match &event.event {
            DomainEvent::LoginFalhou(payload) => info!(
                service = %self.service,
                email = %payload.email,
                reason = %payload.reason,
                emitted_at = %event.emitted_at,
                "Audit: login failed"
            ),
            other => info!(
                service = %self.service,
                event_type = %other.event_type(),
                entity_id = ?other.entity_id(),
                email = other.email().unwrap_or_default(),
                emitted_at = %event.emitted_at,
                "Audit: event recorded"
            ),
        }
        Ok(())
    }
}
