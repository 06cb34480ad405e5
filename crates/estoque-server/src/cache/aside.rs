//! Cache-aside executor used by every service read and write path.
//!
//! ```text
//! fetch_or_compute ─► store.get ──hit──► decode ─► value
//!                         │
//!                    miss / error / undecodable
//!                         ▼
//!                     compute() ──err──► caller
//!                         │
//!                     store.set (best effort) ─► value
//! ```
//!
//! Store failures never reach the caller: the worst case is always-compute.

use estoque_core::cache::ReadKind;
use estoque_core::{CacheNamespace, DEFAULT_TTL};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::store::{CacheError, KeyedCacheStore};
use crate::metrics;

/// How a `fetch_or_compute` call was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from the store.
    Hit,
    /// Not in the store; computed and repopulated.
    Miss,
    /// The store failed; computed without the cache.
    Degraded,
}

enum Lookup<T> {
    Hit(T),
    Miss,
    Unavailable(CacheError),
}

/// Cache-aside policy over a shared `KeyedCacheStore` client.
#[derive(Clone)]
pub struct CacheAside {
    store: Arc<dyn KeyedCacheStore>,
    default_ttl: Duration,
}

impl CacheAside {
    pub fn new(store: Arc<dyn KeyedCacheStore>) -> Self {
        Self {
            store,
            default_ttl: DEFAULT_TTL,
        }
    }

    /// Override the TTL used when callers pass `None`.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn store(&self) -> &Arc<dyn KeyedCacheStore> {
        &self.store
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Return the cached value, or compute it and populate the cache.
    ///
    /// `compute` errors propagate unchanged. Concurrent misses on the same
    /// key each run `compute`; it must be safe to repeat.
    pub async fn fetch_or_compute<T, E, F, Fut>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.fetch_or_compute_with_outcome(namespace, key, ttl, compute)
            .await
            .map(|(value, _)| value)
    }

    /// `fetch_or_compute` with the namespace and TTL of a read kind.
    pub async fn fetch_or_compute_for<T, E, F, Fut>(
        &self,
        kind: ReadKind,
        key: &str,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.fetch_or_compute(kind.namespace(), key, Some(kind.ttl()), compute)
            .await
    }

    /// Same as `fetch_or_compute`, also reporting how the value was served.
    pub async fn fetch_or_compute_with_outcome<T, E, F, Fut>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<(T, CacheOutcome), E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let outcome = match self.lookup::<T>(namespace, key).await {
            Lookup::Hit(value) => {
                debug!(namespace = %namespace, key = %key, "cache hit");
                metrics::record_cache_hit(namespace.as_str());
                return Ok((value, CacheOutcome::Hit));
            }
            Lookup::Miss => {
                debug!(namespace = %namespace, key = %key, "cache miss");
                metrics::record_cache_miss(namespace.as_str());
                CacheOutcome::Miss
            }
            Lookup::Unavailable(e) => {
                warn!(
                    namespace = %namespace,
                    key = %key,
                    error = %e,
                    "cache store unavailable, computing directly"
                );
                metrics::record_cache_error("get");
                metrics::record_cache_miss(namespace.as_str());
                CacheOutcome::Degraded
            }
        };

        let value = compute().await?;
        self.set(namespace, key, &value, ttl).await;
        Ok((value, outcome))
    }

    async fn lookup<T: DeserializeOwned>(&self, namespace: CacheNamespace, key: &str) -> Lookup<T> {
        match self.store.get(namespace, key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => Lookup::Hit(value),
                Err(e) => {
                    warn!(
                        namespace = %namespace,
                        key = %key,
                        error = %e,
                        "cached value could not be decoded, treating as miss"
                    );
                    Lookup::Miss
                }
            },
            Ok(None) => Lookup::Miss,
            Err(e) => Lookup::Unavailable(e),
        }
    }

    /// Read a cached value. Store errors and undecodable values read as `None`.
    pub async fn get<T: DeserializeOwned>(&self, namespace: CacheNamespace, key: &str) -> Option<T> {
        match self.lookup(namespace, key).await {
            Lookup::Hit(value) => {
                metrics::record_cache_hit(namespace.as_str());
                Some(value)
            }
            Lookup::Miss => {
                metrics::record_cache_miss(namespace.as_str());
                None
            }
            Lookup::Unavailable(e) => {
                warn!(namespace = %namespace, key = %key, error = %e, "cache GET failed");
                metrics::record_cache_error("get");
                None
            }
        }
    }

    /// Store a value (best effort).
    pub async fn set<T: Serialize>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) {
        let ttl = ttl.unwrap_or(self.default_ttl);

        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(namespace = %namespace, key = %key, error = %e, "value not cacheable");
                return;
            }
        };

        match self.store.set(namespace, key, &bytes, ttl).await {
            Ok(()) => {
                debug!(namespace = %namespace, key = %key, ttl_secs = ttl.as_secs(), "cache set");
            }
            Err(e) => {
                warn!(namespace = %namespace, key = %key, error = %e, "cache SET failed");
                metrics::record_cache_error("set");
            }
        }
    }

    /// Remove one entry (best effort).
    pub async fn invalidate(&self, namespace: CacheNamespace, key: &str) {
        match self.store.delete(namespace, key).await {
            Ok(existed) => {
                debug!(namespace = %namespace, key = %key, existed, "cache invalidated");
                metrics::record_cache_invalidation(namespace.as_str(), usize::from(existed));
            }
            Err(e) => {
                warn!(namespace = %namespace, key = %key, error = %e, "cache DEL failed");
                metrics::record_cache_error("delete");
            }
        }
    }

    /// Remove every entry of `namespace` matching `pattern` (best effort).
    /// Returns the number of removed entries, 0 on failure.
    pub async fn invalidate_pattern(&self, namespace: CacheNamespace, pattern: &str) -> usize {
        match self.store.delete_by_pattern(namespace, pattern).await {
            Ok(removed) => {
                if removed > 0 {
                    debug!(
                        namespace = %namespace,
                        pattern = %pattern,
                        removed,
                        "cache invalidated by pattern"
                    );
                }
                metrics::record_cache_invalidation(namespace.as_str(), removed);
                removed
            }
            Err(e) => {
                warn!(
                    namespace = %namespace,
                    pattern = %pattern,
                    error = %e,
                    "cache pattern invalidation failed"
                );
                metrics::record_cache_error("delete_by_pattern");
                0
            }
        }
    }

    /// Clear a whole namespace.
    pub async fn invalidate_namespace(&self, namespace: CacheNamespace) -> usize {
        self.invalidate_pattern(namespace, "*").await
    }
}

impl std::fmt::Debug for CacheAside {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheAside")
            .field("mode", &self.store.mode())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}
