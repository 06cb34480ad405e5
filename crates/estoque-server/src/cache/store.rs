//! Keyed cache store abstraction.

use async_trait::async_trait;
use estoque_core::CacheNamespace;
use std::sync::Arc;
use std::time::Duration;

/// Failure of the underlying cache store.
///
/// Store implementations surface these; the cache-aside layer absorbs them.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache pool error: {0}")]
    Pool(String),

    #[error("cache command error: {0}")]
    Command(String),

    #[error("invalid key pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// Namespaced get/set/delete over a key-value store with per-entry expiration.
///
/// Every key is addressed as `(namespace, key)` and stored as
/// `"<namespace>:<key>"`. Single-key operations are atomic in the store;
/// `delete_by_pattern` is not atomic across keys.
#[async_trait]
pub trait KeyedCacheStore: Send + Sync {
    /// Short label for logs ("memory", "redis").
    fn mode(&self) -> &'static str;

    /// Read an entry. Expired entries read as `None`.
    async fn get(
        &self,
        namespace: CacheNamespace,
        key: &str,
    ) -> Result<Option<Arc<Vec<u8>>>, CacheError>;

    /// Write an entry that expires after `ttl`.
    async fn set(
        &self,
        namespace: CacheNamespace,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Remove one entry. Returns whether it existed.
    async fn delete(&self, namespace: CacheNamespace, key: &str) -> Result<bool, CacheError>;

    /// Remove every entry of `namespace` whose key matches the glob `pattern`.
    /// Returns the number of removed entries; zero matches is not an error.
    async fn delete_by_pattern(
        &self,
        namespace: CacheNamespace,
        pattern: &str,
    ) -> Result<usize, CacheError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), CacheError>;
}
