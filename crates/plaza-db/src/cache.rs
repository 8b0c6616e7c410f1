//! Cache-aside reads for users.
//!
//! The store is the source of truth; a [`Cache`] only saves round trips.
//! A cache that is down or slow to accept writes never fails a lookup.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use plaza_types::models::User;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{Result, UserStore};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache value: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Generic byte cache with per-entry expiry.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> std::result::Result<(), CacheError>;
}

/// Upper bound on any single entry's lifetime in a [`MemoryCache`].
const MAX_ENTRY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
struct Entry {
    bytes: Arc<[u8]>,
    ttl: Duration,
}

/// Expires each entry after the TTL it was stored with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache bounded by entry count. Expired and evicted entries are
/// reclaimed by moka's housekeeping, not only on read.
#[derive(Clone)]
pub struct MemoryCache {
    entries: moka::future::Cache<String, Entry>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            entries: moka::future::Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(MAX_ENTRY_TTL)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.get(key).await.map(|entry| entry.bytes.to_vec()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> std::result::Result<(), CacheError> {
        let entry = Entry {
            bytes: value.into(),
            ttl: ttl.min(MAX_ENTRY_TTL),
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }
}

/// Where the auth middleware gets the acting user from.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn user_by_id(&self, id: i64) -> Result<User>;
}

/// Straight to the database.
pub struct StoreUserLookup {
    users: UserStore,
}

impl StoreUserLookup {
    pub fn new(users: UserStore) -> Self {
        Self { users }
    }
}

#[async_trait]
impl UserLookup for StoreUserLookup {
    async fn user_by_id(&self, id: i64) -> Result<User> {
        self.users.get_by_id(id).await
    }
}

/// Cache first, then `source`. A hit is returned as is; a miss is
/// written back on a best-effort basis.
pub struct CachedUserLookup {
    cache: Arc<dyn Cache>,
    source: Arc<dyn UserLookup>,
    ttl: Duration,
}

impl CachedUserLookup {
    pub fn new(cache: Arc<dyn Cache>, source: Arc<dyn UserLookup>, ttl: Duration) -> Self {
        Self { cache, source, ttl }
    }

    fn key(id: i64) -> String {
        format!("user-{}", id)
    }

    async fn cached(&self, key: &str) -> Option<User> {
        let bytes = match self.cache.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read for {} failed: {}", key, e);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    async fn populate(&self, key: &str, user: &User) -> std::result::Result<(), CacheError> {
        let bytes = serde_json::to_vec(user)?;
        self.cache.set(key, bytes, self.ttl).await
    }
}

#[async_trait]
impl UserLookup for CachedUserLookup {
    async fn user_by_id(&self, id: i64) -> Result<User> {
        let key = Self::key(id);
        if let Some(user) = self.cached(&key).await {
            debug!(user_id = id, "User cache hit");
            return Ok(user);
        }

        let user = self.source.user_by_id(id).await?;
        if let Err(e) = self.populate(&key, &user).await {
            warn!("Failed to cache user {}: {}", id, e);
        }
        Ok(user)
    }
}
