//! Shared cache for the inventory services.
//!
//! ## Architecture
//!
//! - **Store**: namespaced key-value entries with per-entry TTL, either
//!   Redis (shared by every service) or an in-process DashMap
//! - **Cache-aside**: `CacheAside` reads through the store, computes on
//!   miss and repopulates; store failures degrade to always-compute
//!
//! ```text
//! read  → CacheAside → store hit? → value
//!                          ↓ no
//!                      compute() → store.set → value
//! write → commit → invalidate own namespace → publish event
//! ```

pub mod aside;
pub mod memory;
pub mod redis;
pub mod store;

pub use aside::{CacheAside, CacheOutcome};
pub use memory::{CachedEntry, MemoryCacheStore};
pub use self::redis::RedisCacheStore;
pub use store::{CacheError, KeyedCacheStore};

use crate::config::RedisConfig;
use std::time::Duration;

/// Build a deadpool-redis pool from configuration.
///
/// The pool is lazy; callers check reachability with `ping`.
pub fn create_redis_pool(config: &RedisConfig) -> Result<deadpool_redis::Pool, CacheError> {
    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let pool_config = redis_config
        .pool
        .get_or_insert_with(|| deadpool_redis::PoolConfig::new(config.pool_size));
    pool_config.max_size = config.pool_size;
    pool_config.timeouts.wait = Some(Duration::from_millis(config.timeout_ms));
    pool_config.timeouts.create = Some(Duration::from_millis(config.timeout_ms));
    pool_config.timeouts.recycle = Some(Duration::from_millis(config.timeout_ms));

    redis_config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| CacheError::Pool(e.to_string()))
}
