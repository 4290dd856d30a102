//! Redis-backed proximity cache.
//!
//! Entries are `SET key '{"result": [...]}' EX ttl`; invalidation is `FLUSHDB`,
//! so the cache should own its Redis database.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::bb8::{Pool, PooledConnection};
use bb8_redis::redis;
use bb8_redis::RedisConnectionManager;

use super::{CacheError, NearestPayload, ProximityCache, ProximityKey};

fn backend(e: impl std::fmt::Display) -> CacheError {
    CacheError::Backend(e.to_string())
}

fn encode_payload(names: &[String]) -> Result<String, CacheError> {
    let payload = NearestPayload {
        result: names.to_vec(),
    };
    Ok(serde_json::to_string(&payload)?)
}

fn decode_payload(raw: &str) -> Result<Vec<String>, CacheError> {
    let payload: NearestPayload = serde_json::from_str(raw)?;
    Ok(payload.result)
}

/// Redis `EX` needs at least one second.
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// A `ProximityCache` backed by a pooled Redis connection.
#[derive(Clone)]
pub struct RedisProximityCache {
    pool: Pool<RedisConnectionManager>,
}

impl RedisProximityCache {
    /// Build a connection pool for `url` (e.g. `redis://localhost`).
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let manager = RedisConnectionManager::new(url).map_err(backend)?;
        let pool = Pool::builder()
            .max_size(16)
            .connection_timeout(Duration::from_secs(5))
            .build(manager)
            .await
            .map_err(backend)?;
        Ok(Self { pool })
    }

    async fn connection(&self) -> Result<PooledConnection<'_, RedisConnectionManager>, CacheError> {
        self.pool.get().await.map_err(backend)
    }
}

#[async_trait]
impl ProximityCache for RedisProximityCache {
    async fn get(&self, key: &ProximityKey) -> Result<Option<Vec<String>>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(key.to_string())
            .query_async(&mut *conn)
            .await
            .map_err(backend)?;
        raw.as_deref().map(decode_payload).transpose()
    }

    async fn put(
        &self,
        key: &ProximityKey,
        names: &[String],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let payload = encode_payload(names)?;
        let mut conn = self.connection().await?;
        let () = redis::cmd("SET")
            .arg(key.to_string())
            .arg(payload)
            .arg("EX")
            .arg(expiry_secs(ttl))
            .query_async(&mut *conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn invalidate_all(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let () = redis::cmd("FLUSHDB")
            .query_async(&mut *conn)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
