//! Redis-backed [`Cache`] implementation, built on a `ConnectionManager` so
//! a dropped connection reconnects transparently instead of failing every
//! call until the pool is recycled.

use crate::{Cache, CacheError, CacheResult};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    client: redis::Client,
}

impl RedisCache {
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(Self { conn, client })
    }

    fn map_err(op: &str, err: redis::RedisError) -> CacheError {
        warn!(operation = op, error = %err, "redis operation failed");
        CacheError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.conn.clone().get(key).await.map_err(|e| Self::map_err("get", e))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.conn
            .clone()
            .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| Self::map_err("set_with_ttl", e))
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.conn.clone().del::<_, ()>(key).await.map_err(|e| Self::map_err("delete", e))
    }

    async fn list_push_head(&self, key: &str, value: &str) -> CacheResult<()> {
        self.conn
            .clone()
            .lpush::<_, _, ()>(key, value)
            .await
            .map_err(|e| Self::map_err("list_push_head", e))
    }

    async fn list_trim_to(&self, key: &str, n: isize) -> CacheResult<()> {
        self.conn
            .clone()
            .ltrim::<_, ()>(key, 0, n.saturating_sub(1))
            .await
            .map_err(|e| Self::map_err("list_trim_to", e))
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> CacheResult<Vec<String>> {
        self.conn
            .clone()
            .lrange(key, start, stop)
            .await
            .map_err(|e| Self::map_err("list_range", e))
    }

    async fn set_add(&self, key: &str, member: &str) -> CacheResult<()> {
        self.conn
            .clone()
            .sadd::<_, _, ()>(key, member)
            .await
            .map_err(|e| Self::map_err("set_add", e))
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        self.conn.clone().smembers(key).await.map_err(|e| Self::map_err("set_members", e))
    }

    async fn zset_add(&self, key: &str, member: &str, score: f64) -> CacheResult<()> {
        self.conn
            .clone()
            .zadd::<_, _, _, ()>(key, member, score)
            .await
            .map_err(|e| Self::map_err("zset_add", e))
    }

    async fn zset_remove_range_by_score(&self, key: &str, lo: f64, hi: f64) -> CacheResult<()> {
        self.conn
            .clone()
            .zrembyscore::<_, _, _, ()>(key, lo, hi)
            .await
            .map_err(|e| Self::map_err("zset_remove_range_by_score", e))
    }

    async fn zset_count(&self, key: &str, lo: f64, hi: f64) -> CacheResult<u64> {
        self.conn
            .clone()
            .zcount(key, lo, hi)
            .await
            .map_err(|e| Self::map_err("zset_count", e))
    }

    async fn zset_min_score(&self, key: &str) -> CacheResult<Option<f64>> {
        let result: Vec<(String, f64)> = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg("+inf")
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(0)
            .arg(1)
            .query_async(&mut self.conn.clone())
            .await
            .map_err(|e| Self::map_err("zset_min_score", e))?;
        Ok(result.into_iter().next().map(|(_, score)| score))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        self.conn
            .clone()
            .expire::<_, ()>(key, ttl.as_secs() as i64)
            .await
            .map_err(|e| Self::map_err("expire", e))
    }

    async fn publish(&self, channel: &str, message: &str) -> CacheResult<()> {
        self.conn
            .clone()
            .publish::<_, _, ()>(channel, message)
            .await
            .map_err(|e| Self::map_err("publish", e))
    }

    async fn subscribe(&self, channel: &str) -> CacheResult<mpsc::Receiver<String>> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| Self::map_err("subscribe", e))?;
        pubsub.subscribe(channel).await.map_err(|e| Self::map_err("subscribe", e))?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let Ok(payload) = msg.get_payload::<String>() else {
                    continue;
                };
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}
