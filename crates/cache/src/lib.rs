//! Cache/KV layer (C3): the operation set the core needs — `get`,
//! `set_with_ttl`, `delete`, list/set/zset primitives and pub/sub —
//! abstracted behind [`Cache`] so the core never talks to `redis` directly.
//! Cache failures are non-fatal; callers fall back to the store and log a
//! degraded-mode warning (§4.3).

pub mod in_process;
pub mod redis_cache;

pub use in_process::InProcessCache;
pub use redis_cache::RedisCache;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache serialization error: {0}")]
    Serialization(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// The cache operation set used by the core (§4.3). Implemented by
/// [`RedisCache`] against a real Redis/Valkey instance and by
/// [`InProcessCache`] as the in-memory degraded-mode fallback; both must
/// honour identical semantics so callers can swap one for the other
/// transparently on connectivity loss.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;
    async fn delete(&self, key: &str) -> CacheResult<()>;

    async fn list_push_head(&self, key: &str, value: &str) -> CacheResult<()>;
    async fn list_trim_to(&self, key: &str, n: isize) -> CacheResult<()>;
    async fn list_range(&self, key: &str, start: isize, stop: isize) -> CacheResult<Vec<String>>;

    async fn set_add(&self, key: &str, member: &str) -> CacheResult<()>;
    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>>;

    async fn zset_add(&self, key: &str, member: &str, score: f64) -> CacheResult<()>;
    async fn zset_remove_range_by_score(&self, key: &str, lo: f64, hi: f64) -> CacheResult<()>;
    async fn zset_count(&self, key: &str, lo: f64, hi: f64) -> CacheResult<u64>;
    /// Lowest-scored member currently in the set, if any — used by the
    /// Admission Controller to compute `retry_after_s` (§4.4).
    async fn zset_min_score(&self, key: &str) -> CacheResult<Option<f64>>;
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()>;

    async fn publish(&self, channel: &str, message: &str) -> CacheResult<()>;

    /// Subscribes to `channel`, returning a receiver fed one message per
    /// `publish` call on that channel from any process (§4.3, §4.5). The
    /// subscription is torn down by dropping the receiver.
    async fn subscribe(&self, channel: &str) -> CacheResult<tokio::sync::mpsc::Receiver<String>>;
}

/// Serializes `value` and stores it under `key` with `ttl`, the common case
/// callers hit for the device-location hot cache and geofence mutation
/// mirrors (§4.3, §4.5, §4.6).
pub async fn set_json_with_ttl<T: serde::Serialize + Sync>(
    cache: &dyn Cache,
    key: &str,
    value: &T,
    ttl: Duration,
) -> CacheResult<()> {
    let encoded = serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
    cache.set_with_ttl(key, &encoded, ttl).await
}

pub async fn get_json<T: serde::de::DeserializeOwned>(cache: &dyn Cache, key: &str) -> CacheResult<Option<T>> {
    match cache.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| CacheError::Serialization(e.to_string())),
        None => Ok(None),
    }
}
