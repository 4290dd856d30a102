//! In-process proximity cache on `moka`, with a per-entry TTL.
//!
//! Expired entries are dropped by moka's housekeeping whether or not they are
//! read again, and the cache is capped at `MAX_ENTRIES`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;

use super::{CacheError, ProximityCache, ProximityKey};

const MAX_ENTRIES: u64 = 10_000;

#[derive(Debug, Clone)]
struct CachedNames {
    names: Vec<String>,
    ttl: Duration,
}

/// Each entry lives for the TTL it was stored with.
struct StoredTtl;

impl Expiry<String, CachedNames> for StoredTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedNames,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedNames,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// A `ProximityCache` held in memory.
#[derive(Clone)]
pub struct InMemoryProximityCache {
    entries: Cache<String, CachedNames>,
}

impl Default for InMemoryProximityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProximityCache {
    pub fn new() -> Self {
        let entries = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .expire_after(StoredTtl)
            .build();
        Self { entries }
    }

    /// Number of live entries, after pending evictions have run.
    pub async fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}

#[async_trait]
impl ProximityCache for InMemoryProximityCache {
    async fn get(&self, key: &ProximityKey) -> Result<Option<Vec<String>>, CacheError> {
        Ok(self.entries.get(&key.to_string()).await.map(|e| e.names))
    }

    async fn put(
        &self,
        key: &ProximityKey,
        names: &[String],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let entry = CachedNames {
            names: names.to_vec(),
            ttl,
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn invalidate_all(&self) -> Result<(), CacheError> {
        self.entries.invalidate_all();
        Ok(())
    }
}
