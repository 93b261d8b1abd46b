//! Server-side fragment storage.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Prefix of every fragment cache entry key.
pub const FRAGMENT_CACHE_PREFIX: &str = "fragment:";

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to serialize/deserialize cache entry.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend storage error.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Status of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Fresh cache hit.
    Hit,
    /// Cache miss.
    Miss,
    /// Bypass - caching disabled.
    Bypass,
    /// Error during cache operation.
    Error,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Miss => write!(f, "MISS"),
            Self::Bypass => write!(f, "BYPASS"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A cached fragment entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFragment {
    /// The cached HTML content.
    pub content: String,
    /// When the entry was created (Unix seconds).
    pub created_at: u64,
    /// Time-to-live in seconds.
    pub ttl_secs: u64,
}

impl CachedFragment {
    /// Create a new cached fragment.
    pub fn new(content: impl Into<String>, ttl: Duration, now: u64) -> Self {
        Self {
            content: content.into(),
            created_at: now,
            ttl_secs: ttl.as_secs(),
        }
    }

    /// Check if the entry has expired at `now`.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at()
    }

    /// Remaining TTL in seconds at `now`.
    pub fn remaining_ttl_at(&self, now: u64) -> u64 {
        self.expires_at().saturating_sub(now)
    }

    /// Unix timestamp at which the entry expires. Saturates for very long TTLs.
    pub fn expires_at(&self) -> u64 {
        self.created_at.saturating_add(self.ttl_secs)
    }

    /// Age in seconds at `now`.
    pub fn age_at(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }
}

/// Storage for rendered fragments.
pub trait FragmentStore: Send + Sync {
    /// Get a cached fragment.
    fn get(&self, key: &str) -> CacheResult<Option<CachedFragment>>;

    /// Store a fragment.
    fn set(&self, key: &str, fragment: CachedFragment) -> CacheResult<()>;

    /// Delete a fragment.
    fn delete(&self, key: &str) -> CacheResult<()>;

    /// Delete every entry whose key starts with `prefix`; returns the count.
    fn delete_prefix(&self, prefix: &str) -> CacheResult<u64>;
}

/// Build the store key for a fragment path and context digest.
pub fn fragment_cache_key(path: &str, context: Option<&str>) -> String {
    match context {
        Some(context) => format!("{}{}|{}", FRAGMENT_CACHE_PREFIX, path, context),
        None => format!("{}{}", FRAGMENT_CACHE_PREFIX, path),
    }
}

/// In-process fragment store.
#[derive(Debug, Default)]
pub struct InMemoryFragmentStore {
    entries: RwLock<HashMap<String, CachedFragment>>,
}

impl InMemoryFragmentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl FragmentStore for InMemoryFragmentStore {
    fn get(&self, key: &str) -> CacheResult<Option<CachedFragment>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, fragment: CachedFragment) -> CacheResult<()> {
        self.entries.write().insert(key.to_string(), fragment);
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry() {
        let entry = CachedFragment::new("<p>hi</p>", Duration::from_secs(60), 1_000);
        assert!(!entry.is_expired_at(1_059));
        assert!(entry.is_expired_at(1_060));
        assert_eq!(entry.remaining_ttl_at(1_030), 30);
        assert_eq!(entry.age_at(1_030), 30);
        assert_eq!(entry.remaining_ttl_at(2_000), 0);
    }

    #[test]
    fn test_unbounded_ttl_never_expires() {
        let entry = CachedFragment::new("x", Duration::from_secs(u64::MAX), 1_000);
        assert_eq!(entry.expires_at(), u64::MAX);
        assert!(!entry.is_expired_at(2_000_000_000));
        assert_eq!(entry.remaining_ttl_at(1_000), u64::MAX - 1_000);
    }

    #[test]
    fn test_keys_share_prefix() {
        assert_eq!(fragment_cache_key("esi/block/a:b:c:d", None), "fragment:esi/block/a:b:c:d");
        assert_eq!(
            fragment_cache_key("esi/block/a:b:c:d", Some("abc")),
            "fragment:esi/block/a:b:c:d|abc"
        );
    }

    #[test]
    fn test_delete_prefix_is_idempotent() {
        let store = InMemoryFragmentStore::new();
        let entry = CachedFragment::new("x", Duration::from_secs(10), 0);
        store.set(&fragment_cache_key("a", None), entry.clone()).unwrap();
        store.set(&fragment_cache_key("b", Some("u")), entry.clone()).unwrap();
        store.set("other:c", entry).unwrap();

        assert_eq!(store.delete_prefix(FRAGMENT_CACHE_PREFIX).unwrap(), 2);
        assert_eq!(store.delete_prefix(FRAGMENT_CACHE_PREFIX).unwrap(), 0);
        assert_eq!(store.len(), 1);
        assert!(store.get("other:c").unwrap().is_some());
    }
}
