//! In-process cache store backed by DashMap.
//!
//! Used when Redis is disabled (single-process deployments) and in tests.

use async_trait::async_trait;
use dashmap::DashMap;
use estoque_core::CacheNamespace;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::store::{CacheError, KeyedCacheStore};

/// A cached entry with an expiration instant.
///
/// The data is wrapped in `Arc` so hits are cheap clones.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub expires_at: Instant,
}

impl CachedEntry {
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Local cache store.
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<DashMap<String, CachedEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a live entry exists for `(namespace, key)`.
    pub fn contains(&self, namespace: CacheNamespace, key: &str) -> bool {
        self.entries
            .get(&namespace.key(key))
            .is_some_and(|entry| !entry.is_expired())
    }
}

#[async_trait]
impl KeyedCacheStore for MemoryCacheStore {
    fn mode(&self) -> &'static str {
        "memory"
    }

    async fn get(
        &self,
        namespace: CacheNamespace,
        key: &str,
    ) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        let full_key = namespace.key(key);

        if let Some(entry) = self.entries.get(&full_key) {
            if !entry.is_expired() {
                return Ok(Some(Arc::clone(&entry.data)));
            }
            // Remove expired entry
            drop(entry);
            self.entries.remove_if(&full_key, |_, entry| entry.is_expired());
        }

        Ok(None)
    }

    async fn set(
        &self,
        namespace: CacheNamespace,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.entries
            .insert(namespace.key(key), CachedEntry::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn delete(&self, namespace: CacheNamespace, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(&namespace.key(key)).is_some())
    }

    async fn delete_by_pattern(
        &self,
        namespace: CacheNamespace,
        pattern: &str,
    ) -> Result<usize, CacheError> {
        let matcher = glob_to_regex(&namespace.pattern(pattern))?;

        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| matcher.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let removed = matching
            .iter()
            .filter(|key| self.entries.remove(*key).is_some())
            .count();

        Ok(removed)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Translate a Redis-style glob (`*`, `?`, `[...]`, `\` escapes) into an
/// anchored regex.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex, CacheError> {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex::escape(&next.to_string()));
                }
            }
            '[' => {
                out.push('[');
                let mut closed = false;
                for (i, inner) in chars.by_ref().enumerate() {
                    match inner {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '^' if i == 0 => out.push('^'),
                        '-' => out.push('-'),
                        other => out.push_str(&regex::escape(&other.to_string())),
                    }
                }
                if !closed {
                    return Err(CacheError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: "unterminated character class".to_string(),
                    });
                }
                out.push(']');
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    Regex::new(&out).map_err(|e| CacheError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
