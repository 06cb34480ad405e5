pub mod cache;
pub mod config;
pub mod context;
pub mod events;
pub mod metrics;
pub mod observability;
pub mod orchestration;

pub use cache::{CacheAside, CacheError, CacheOutcome, KeyedCacheStore, MemoryCacheStore};
pub use config::{AppConfig, CacheConfig, ConfigError, EnrichmentConfig, EventsConfig, RedisConfig};
pub use context::{ServiceContext, StartupError};
pub use events::{
    ActiveSubscription, EventPublisher, EventTransport, MemoryTransport, PublishError,
    SubscribeError, SubscriberBuilder,
};
pub use observability::{apply_logging_level, init_tracing};
pub use orchestration::{Coordinator, Service, SiblingClient};
