//! In-process fallback cache (§4.4 degraded mode), mirroring the Python
//! original's `InMemoryRateLimiter` pattern but generalised to the full
//! [`Cache`] surface so any cache-backed service degrades gracefully.

use crate::{Cache, CacheError, CacheResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};

#[derive(Default)]
struct Entry {
    value: Option<String>,
    list: Vec<String>,
    set: HashSet<String>,
    zset: BTreeMap<String, f64>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.map(|at| Instant::now() >= at).unwrap_or(false)
    }
}

/// A single-process, single-node cache. Correct for tests and for running
/// without Redis; does not survive a restart. `publish`/`subscribe` fan out
/// to other subscribers in this same process via a broadcast channel, but
/// — unlike `RedisCache` — never reach another process.
pub struct InProcessCache {
    entries: Mutex<HashMap<String, Entry>>,
    channel: broadcast::Sender<(String, String)>,
}

impl Default for InProcessCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessCache {
    pub fn new() -> Self {
        let (channel, _) = broadcast::channel(256);
        Self {
            entries: Mutex::new(HashMap::new()),
            channel,
        }
    }

    fn with_entry<R>(&self, key: &str, f: impl FnOnce(&mut Entry) -> R) -> R {
        let mut guard = self.entries.lock().expect("in-process cache mutex poisoned");
        let entry = guard.entry(key.to_string()).or_default();
        if entry.expired() {
            *entry = Entry::default();
        }
        f(entry)
    }
}

#[async_trait]
impl Cache for InProcessCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.with_entry(key, |e| e.value.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.with_entry(key, |e| {
            e.value = Some(value.to_string());
            e.expires_at = Some(Instant::now() + ttl);
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.lock().expect("in-process cache mutex poisoned").remove(key);
        Ok(())
    }

    async fn list_push_head(&self, key: &str, value: &str) -> CacheResult<()> {
        self.with_entry(key, |e| e.list.insert(0, value.to_string()));
        Ok(())
    }

    async fn list_trim_to(&self, key: &str, n: isize) -> CacheResult<()> {
        self.with_entry(key, |e| e.list.truncate(n.max(0) as usize));
        Ok(())
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> CacheResult<Vec<String>> {
        Ok(self.with_entry(key, |e| {
            let len = e.list.len() as isize;
            let norm = |i: isize| -> usize { if i < 0 { (len + i).max(0) as usize } else { i.min(len) as usize } };
            let (s, end) = (norm(start), norm(stop + 1));
            if s >= e.list.len() || s >= end {
                Vec::new()
            } else {
                e.list[s..end.min(e.list.len())].to_vec()
            }
        }))
    }

    async fn set_add(&self, key: &str, member: &str) -> CacheResult<()> {
        self.with_entry(key, |e| {
            e.set.insert(member.to_string());
        });
        Ok(())
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        Ok(self.with_entry(key, |e| e.set.iter().cloned().collect()))
    }

    async fn zset_add(&self, key: &str, member: &str, score: f64) -> CacheResult<()> {
        self.with_entry(key, |e| {
            e.zset.insert(member.to_string(), score);
        });
        Ok(())
    }

    async fn zset_remove_range_by_score(&self, key: &str, lo: f64, hi: f64) -> CacheResult<()> {
        self.with_entry(key, |e| e.zset.retain(|_, &mut score| score < lo || score > hi));
        Ok(())
    }

    async fn zset_count(&self, key: &str, lo: f64, hi: f64) -> CacheResult<u64> {
        Ok(self.with_entry(key, |e| e.zset.values().filter(|&&s| s >= lo && s <= hi).count() as u64))
    }

    async fn zset_min_score(&self, key: &str) -> CacheResult<Option<f64>> {
        Ok(self.with_entry(key, |e| e.zset.values().cloned().fold(None, |acc, s| match acc {
            Some(min) if min <= s => Some(min),
            _ => Some(s),
        })))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        self.with_entry(key, |e| e.expires_at = Some(Instant::now() + ttl));
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> CacheResult<()> {
        // No receiver is an error in `tokio::sync::broadcast`; that's the
        // expected case when nothing in this process has subscribed yet.
        let _ = self.channel.send((channel.to_string(), message.to_string()));
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> CacheResult<mpsc::Receiver<String>> {
        let mut broadcast_rx = self.channel.subscribe();
        let (tx, rx) = mpsc::channel(64);
        let channel = channel.to_string();
        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok((ch, message)) if ch == channel => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }
}
