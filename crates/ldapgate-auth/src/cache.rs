//! Verdict cache
//!
//! The authenticator only needs `get` and `set` with a time-to-live, so any
//! key/value backend can sit behind [`KeyValueCache`]. [`MemoryCache`] is
//! the in-process default.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Number of entries above which writes also sweep expired entries
const PURGE_THRESHOLD: usize = 1024;

/// Key/value store with per-entry expiry, shared by concurrent requests
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Value stored under `key`, or `None` when absent or expired
    async fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key` for `ttl`. Last writer wins.
    async fn set(&self, key: &str, value: &str, ttl: Duration);
}

/// Cached outcome of a credential check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheVerdict {
    Valid,
    Invalid,
}

impl CacheVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheVerdict::Valid => "valid",
            CacheVerdict::Invalid => "invalid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "valid" => Some(CacheVerdict::Valid),
            "invalid" => Some(CacheVerdict::Invalid),
            _ => None,
        }
    }
}

struct CachedValue {
    value: String,
    expires_at: Instant,
}

/// In-memory cache backend
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CachedValue>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until swept
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every entry
    pub async fn flush(&self) {
        self.entries.write().await.clear();
        debug!("Verdict cache flushed");
    }

    /// Drop expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, cached| cached.expires_at > now);
        before - entries.len()
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;

        match entries.get(key) {
            Some(cached) if cached.expires_at > Instant::now() => Some(cached.value.clone()),
            _ => None,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let now = Instant::now();
        // Unrepresentable expiry: nothing is stored
        let Some(expires_at) = now.checked_add(ttl) else {
            return;
        };

        let mut entries = self.entries.write().await;
        if entries.len() >= PURGE_THRESHOLD {
            entries.retain(|_, cached| cached.expires_at > now);
        }

        entries.insert(
            key.to_string(),
            CachedValue {
                value: value.to_string(),
                expires_at,
            },
        );
    }
}
