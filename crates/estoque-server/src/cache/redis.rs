//! Redis-backed cache store shared by every service instance.

use async_trait::async_trait;
use deadpool_redis::Pool;
use deadpool_redis::redis::{self, AsyncCommands};
use estoque_core::CacheNamespace;
use std::sync::Arc;
use std::time::Duration;

use super::store::{CacheError, KeyedCacheStore};

/// Keys requested per `SCAN` round trip.
const SCAN_BATCH: usize = 500;

/// Cache store over a deadpool-redis pool.
///
/// Pattern deletion walks the keyspace with `SCAN MATCH` rather than `KEYS`
/// so large namespaces don't block the server.
#[derive(Clone)]
pub struct RedisCacheStore {
    pool: Pool,
}

impl RedisCacheStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Pool(e.to_string()))
    }
}

#[async_trait]
impl KeyedCacheStore for RedisCacheStore {
    fn mode(&self) -> &'static str {
        "redis"
    }

    async fn get(
        &self,
        namespace: CacheNamespace,
        key: &str,
    ) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        let mut conn = self.connection().await?;
        let data: Option<Vec<u8>> = conn
            .get(namespace.key(key))
            .await
            .map_err(|e| CacheError::Command(e.to_string()))?;
        Ok(data.map(Arc::new))
    }

    async fn set(
        &self,
        namespace: CacheNamespace,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        // PX keeps sub-second TTLs meaningful; Redis rejects 0
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        conn.pset_ex::<_, _, ()>(namespace.key(key), value, ttl_ms)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))
    }

    async fn delete(&self, namespace: CacheNamespace, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let removed: usize = conn
            .del(namespace.key(key))
            .await
            .map_err(|e| CacheError::Command(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn delete_by_pattern(
        &self,
        namespace: CacheNamespace,
        pattern: &str,
    ) -> Result<usize, CacheError> {
        let mut conn = self.connection().await?;
        let full_pattern = namespace.pattern(pattern);

        let mut cursor: u64 = 0;
        let mut removed = 0usize;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&full_pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::Command(e.to_string()))?;

            if !keys.is_empty() {
                let count: usize = conn
                    .del(&keys)
                    .await
                    .map_err(|e| CacheError::Command(e.to_string()))?;
                removed += count;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
