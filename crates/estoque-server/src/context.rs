//! Process-wide wiring of one service's cache and event clients.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::{self, CacheAside, CacheError, KeyedCacheStore, MemoryCacheStore, RedisCacheStore};
use crate::config::AppConfig;
use crate::events::{
    ActiveSubscription, EventPublisher, EventTransport, MemoryTransport, RedisTransport,
    SubscribeError, SubscriberBuilder, TransportError,
};
use crate::orchestration::{Coordinator, EnrichmentError, Service, SiblingClient};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Subscribe(#[from] SubscribeError),

    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),
}

/// The cache client, publisher and subscription of one running service.
///
/// One instance per process, shared by every request.
pub struct ServiceContext {
    coordinator: Coordinator,
    subscription: Option<ActiveSubscription>,
    siblings: Option<Arc<SiblingClient>>,
}

impl ServiceContext {
    /// Connect the clients selected by `config` and subscribe to the
    /// service's events.
    ///
    /// With Redis disabled the cache and bus are in-process; only services
    /// sharing the process see each other's events.
    pub async fn start(config: &AppConfig, service: Service) -> Result<Self, StartupError> {
        let (store, transport): (Arc<dyn KeyedCacheStore>, Arc<dyn EventTransport>) =
            if config.redis.enabled {
                info!(url = %config.redis.url, "Connecting to Redis");
                let pool = cache::create_redis_pool(&config.redis)?;
                let store = RedisCacheStore::new(pool.clone());
                if let Err(e) = store.ping().await {
                    warn!(
                        error = %e,
                        "Redis cache unreachable at startup, reads will compute until it recovers"
                    );
                }
                let transport = RedisTransport::new(pool, &config.redis.url)?;
                (Arc::new(store), Arc::new(transport))
            } else {
                info!("Redis disabled, using in-process cache and event bus");
                (
                    Arc::new(MemoryCacheStore::new()),
                    Arc::new(MemoryTransport::new()),
                )
            };

        Self::start_with(config, service, store, transport).await
    }

    /// Same as `start`, over caller-provided store and transport.
    pub async fn start_with(
        config: &AppConfig,
        service: Service,
        store: Arc<dyn KeyedCacheStore>,
        transport: Arc<dyn EventTransport>,
    ) -> Result<Self, StartupError> {
        let cache = CacheAside::new(store).with_default_ttl(config.cache.default_ttl());
        let publisher = EventPublisher::new(transport.clone(), service.name());
        let coordinator = Coordinator::new(service, cache, publisher);

        let subscribed = coordinator.subscribed_types();
        let subscription = if subscribed.is_empty() {
            info!(service = %service, "No event subscriptions for this service");
            None
        } else {
            let builder = SubscriberBuilder::new(transport)
                .with_handler_timeout(config.events.handler_timeout())
                .with_reconnect(config.events.reconnect_policy());
            let subscription = coordinator.subscriber(builder).subscribe(&subscribed).await?;
            Some(subscription)
        };

        let siblings = if config.enrichment.enabled && service == Service::Produtos {
            Some(Arc::new(SiblingClient::from_config(&config.enrichment)?))
        } else {
            None
        };

        info!(
            service = %service,
            cache = coordinator.cache().store().mode(),
            subscriptions = subscribed.len(),
            enrichment = siblings.is_some(),
            "Service context started"
        );

        Ok(Self {
            coordinator,
            subscription,
            siblings,
        })
    }

    pub fn service(&self) -> Service {
        self.coordinator.service()
    }

    pub fn cache(&self) -> &CacheAside {
        self.coordinator.cache()
    }

    pub fn publisher(&self) -> &EventPublisher {
        self.coordinator.publisher()
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn siblings(&self) -> Option<&Arc<SiblingClient>> {
        self.siblings.as_ref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(ActiveSubscription::is_active)
    }

    /// Stop the subscription. Cached entries are left to expire.
    pub async fn shutdown(mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe().await;
        }
        info!(service = %self.service(), "Service context stopped");
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("coordinator", &self.coordinator)
            .field("subscription", &self.subscription)
            .field("siblings", &self.siblings)
            .finish()
    }
}
