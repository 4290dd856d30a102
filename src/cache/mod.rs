//! Proximity cache: nearest-city answers keyed by the exact query point.
//!
//! Any registry write clears the whole cache, since a single new or removed
//! city can change the ranking for every cached point.

pub mod memory;
pub mod redis;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::InMemoryProximityCache;
pub use self::redis::RedisProximityCache;

/// How many cities a nearest query returns unless told otherwise.
pub const DEFAULT_NEAREST_LIMIT: usize = 2;

/// Lifetime of a cached nearest answer.
pub const DEFAULT_NEAREST_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache key for a nearest query. Coordinates are compared exactly, not bucketed.
///
/// Renders as `"{lat},{lon}"` for the default limit and `"{lat},{lon}@{limit}"`
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityKey {
    pub lat: f64,
    pub lon: f64,
    pub limit: usize,
}

impl ProximityKey {
    pub fn new(lat: f64, lon: f64, limit: usize) -> Self {
        Self { lat, lon, limit }
    }
}

impl fmt::Display for ProximityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_coord(f, self.lat)?;
        f.write_str(",")?;
        write_coord(f, self.lon)?;
        if self.limit != DEFAULT_NEAREST_LIMIT {
            write!(f, "@{}", self.limit)?;
        }
        Ok(())
    }
}

/// Whole-number coordinates keep one decimal place (`55.0`, not `55`), so keys
/// match those written by other clients of a shared Redis.
fn write_coord(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if value.fract() == 0.0 && value.abs() < 1e16 {
        write!(f, "{:.1}", value)
    } else {
        write!(f, "{}", value)
    }
}

/// Stored form of a nearest answer; identical to the `/near` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearestPayload {
    pub result: Vec<String>,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

#[async_trait]
pub trait ProximityCache: Send + Sync {
    /// Cached names for `key`, nearest first. Expired entries count as a miss.
    async fn get(&self, key: &ProximityKey) -> Result<Option<Vec<String>>, CacheError>;

    /// Store `names` under `key`, replacing any previous entry.
    async fn put(
        &self,
        key: &ProximityKey,
        names: &[String],
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Drop every entry.
    async fn invalidate_all(&self) -> Result<(), CacheError>;
}
