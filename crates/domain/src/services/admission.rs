//! Admission Controller (C4): tiered sliding-window-log rate limiting.
//!
//! Grounded on `original_source/app/utils/rate_limiter.py`'s `RateLimiter`
//! (Redis zset sliding window) and `InMemoryRateLimiter` (fallback), merged
//! into one windowing algorithm parameterised over a `Cache` the caller
//! supplies, plus a pure in-process fallback used when the cache is down.

use crate::models::Tier;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// One of the three concurrent windows evaluated per admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    Minute,
    Hour,
    Day,
}

impl Window {
    pub fn seconds(&self) -> i64 {
        match self {
            Window::Minute => 60,
            Window::Hour => 3_600,
            Window::Day => 86_400,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Window::Minute => "minute",
            Window::Hour => "hour",
            Window::Day => "day",
        }
    }
}

/// Per-tier limits (§4.4 table). `max_devices`/`max_geofences`/
/// `max_route_waypoints` are resource quotas, not rate windows, but live
/// alongside the rate limits since both gate on `Tier`.
#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
    pub max_devices: u32,
    pub max_geofences: u32,
    pub max_route_waypoints: u32,
}

pub fn limits_for(tier: Tier) -> TierLimits {
    match tier {
        Tier::Free => TierLimits {
            per_minute: 60,
            per_hour: 1_000,
            per_day: 10_000,
            max_devices: 5,
            max_geofences: 10,
            max_route_waypoints: 10,
        },
        Tier::Basic => TierLimits {
            per_minute: 300,
            per_hour: 10_000,
            per_day: 100_000,
            max_devices: 50,
            max_geofences: 100,
            max_route_waypoints: 25,
        },
        Tier::Professional => TierLimits {
            per_minute: 1_000,
            per_hour: 50_000,
            per_day: 1_000_000,
            max_devices: 500,
            max_geofences: 1_000,
            max_route_waypoints: 100,
        },
        Tier::Enterprise => TierLimits {
            per_minute: 5_000,
            per_hour: 200_000,
            per_day: 5_000_000,
            max_devices: 10_000,
            max_geofences: 10_000,
            max_route_waypoints: 500,
        },
    }
}

impl TierLimits {
    fn limit_for(&self, window: Window) -> u32 {
        match window {
            Window::Minute => self.per_minute,
            Window::Hour => self.per_hour,
            Window::Day => self.per_day,
        }
    }
}

/// Outcome of an admission check for one window.
#[derive(Debug, Clone)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub scope: &'static str,
    pub limit: u32,
    pub remaining: u32,
    pub retry_after_s: i64,
}

/// Sliding-window-log counter backed by a cache zset. The core uses this
/// trait so both the real `Cache` (C3) and test doubles can drive it; kept
/// deliberately narrow (score-ordered set of instants) rather than pulling
/// in the full cache crate as a dependency of `domain`.
#[async_trait::async_trait]
pub trait WindowCounter: Send + Sync {
    /// Removes entries with score `<= cutoff`, returns the remaining count,
    /// and — if `admit` is true and the count is under `limit` — adds one
    /// entry scored `now` and sets the key's TTL to `window_secs + 1`.
    async fn prune_count_and_maybe_admit(
        &self,
        key: &str,
        now_ms: i64,
        cutoff_ms: i64,
        window_secs: i64,
        limit: u32,
        admit: bool,
    ) -> Result<(u32, bool), AdmissionCacheError>;

    /// Oldest surviving entry's score, used to compute `retry_after_s`.
    async fn oldest_score_ms(&self, key: &str) -> Result<Option<i64>, AdmissionCacheError>;
}

#[derive(Debug, thiserror::Error)]
#[error("admission cache error: {0}")]
pub struct AdmissionCacheError(pub String);

/// Evaluates all three windows for `identifier` under `tier`, applying the
/// highest-priority denial first (minute, then hour, then day) so the
/// caller reports the tightest-binding window.
pub async fn check_admission(
    counter: &dyn WindowCounter,
    identifier: &str,
    tier: Tier,
    now: DateTime<Utc>,
) -> Result<AdmissionDecision, AdmissionCacheError> {
    let limits = limits_for(tier);
    let now_ms = now.timestamp_millis();

    // Evaluate read-only first so a denial on any window doesn't record a
    // partial admission on another.
    let mut counts = HashMap::new();
    for window in [Window::Minute, Window::Hour, Window::Day] {
        let key = window_key(identifier, window);
        let cutoff_ms = now_ms - window.seconds() * 1000;
        let (count, _) = counter
            .prune_count_and_maybe_admit(&key, now_ms, cutoff_ms, window.seconds(), limits.limit_for(window), false)
            .await?;
        counts.insert(window, count);
    }

    for window in [Window::Minute, Window::Hour, Window::Day] {
        let limit = limits.limit_for(window);
        if counts[&window] >= limit {
            let key = window_key(identifier, window);
            let retry_after_s = match counter.oldest_score_ms(&key).await? {
                Some(oldest_ms) => ((oldest_ms + window.seconds() * 1000 - now_ms).max(0)) / 1000,
                None => window.seconds(),
            };
            return Ok(AdmissionDecision {
                allowed: false,
                scope: window.label(),
                limit,
                remaining: 0,
                retry_after_s,
            });
        }
    }

    // All windows under limit: record the admission on each.
    for window in [Window::Minute, Window::Hour, Window::Day] {
        let key = window_key(identifier, window);
        let cutoff_ms = now_ms - window.seconds() * 1000;
        counter
            .prune_count_and_maybe_admit(&key, now_ms, cutoff_ms, window.seconds(), limits.limit_for(window), true)
            .await?;
    }

    let remaining = limits.per_minute.saturating_sub(counts[&Window::Minute] + 1);
    Ok(AdmissionDecision {
        allowed: true,
        scope: Window::Minute.label(),
        limit: limits.per_minute,
        remaining,
        retry_after_s: 0,
    })
}

fn window_key(identifier: &str, window: Window) -> String {
    format!("ratelimit:{}:{}", window.label(), identifier)
}

/// In-process fallback used when the cache is unavailable (§4.4 "falls
/// back to an in-process window with identical semantics"). Mirrors
/// `InMemoryRateLimiter` from the Python original.
pub struct InProcessLimiter {
    windows: Mutex<HashMap<String, Vec<i64>>>,
}

impl Default for InProcessLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, identifier: &str, tier: Tier, now: DateTime<Utc>) -> AdmissionDecision {
        let limits = limits_for(tier);
        let now_ms = now.timestamp_millis();
        let mut guard = self.windows.lock().expect("in-process limiter mutex poisoned");

        for window in [Window::Minute, Window::Hour, Window::Day] {
            let key = format!("{}:{}", window.label(), identifier);
            let cutoff_ms = now_ms - window.seconds() * 1000;
            let entries = guard.entry(key.clone()).or_default();
            entries.retain(|&t| t > cutoff_ms);
            let limit = limits.limit_for(window);
            if entries.len() as u32 >= limit {
                let oldest = entries.iter().copied().min().unwrap_or(now_ms);
                let retry_after_s = ((oldest + window.seconds() * 1000 - now_ms).max(0)) / 1000;
                return AdmissionDecision {
                    allowed: false,
                    scope: window.label(),
                    limit,
                    remaining: 0,
                    retry_after_s,
                };
            }
        }

        for window in [Window::Minute, Window::Hour, Window::Day] {
            let key = format!("{}:{}", window.label(), identifier);
            guard.entry(key).or_default().push(now_ms);
        }

        let minute_key = format!("{}:{}", Window::Minute.label(), identifier);
        let used = guard.get(&minute_key).map(|v| v.len() as u32).unwrap_or(0);
        AdmissionDecision {
            allowed: true,
            scope: Window::Minute.label(),
            limit: limits.per_minute,
            remaining: limits.per_minute.saturating_sub(used),
            retry_after_s: 0,
        }
    }
}

/// Identifier precedence (§4.4, supplemented from
/// `original_source/app/utils/rate_limiter.py::get_client_identifier`):
/// authenticated user id, then API-key prefix, then proxy-aware client IP.
pub fn derive_identifier(user_id: Option<uuid::Uuid>, api_key_prefix: Option<&str>, client_ip: &str) -> String {
    if let Some(uid) = user_id {
        return format!("user:{uid}");
    }
    if let Some(prefix) = api_key_prefix {
        return format!("api_key:{prefix}");
    }
    format!("ip:{client_ip}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_for_each_tier_match_table() {
        let free = limits_for(Tier::Free);
        assert_eq!((free.per_minute, free.per_hour, free.per_day), (60, 1_000, 10_000));
        assert_eq!((free.max_devices, free.max_geofences, free.max_route_waypoints), (5, 10, 10));

        let enterprise = limits_for(Tier::Enterprise);
        assert_eq!(
            (enterprise.per_minute, enterprise.per_hour, enterprise.per_day),
            (5_000, 200_000, 5_000_000)
        );
    }

    #[test]
    fn test_derive_identifier_precedence() {
        let uid = uuid::Uuid::new_v4();
        assert_eq!(derive_identifier(Some(uid), Some("abcd1234"), "1.2.3.4"), format!("user:{uid}"));
        assert_eq!(derive_identifier(None, Some("abcd1234"), "1.2.3.4"), "api_key:abcd1234");
        assert_eq!(derive_identifier(None, None, "1.2.3.4"), "ip:1.2.3.4");
    }

    #[test]
    fn test_in_process_limiter_denies_after_limit() {
        let limiter = InProcessLimiter::new();
        let now = Utc::now();
        for _ in 0..60 {
            let decision = limiter.check("dev", Tier::Free, now);
            assert!(decision.allowed);
        }
        let decision = limiter.check("dev", Tier::Free, now);
        assert!(!decision.allowed);
        assert_eq!(decision.scope, "minute");
    }

    #[test]
    fn test_in_process_limiter_window_slides() {
        let limiter = InProcessLimiter::new();
        let now = Utc::now();
        for _ in 0..60 {
            assert!(limiter.check("dev2", Tier::Free, now).allowed);
        }
        assert!(!limiter.check("dev2", Tier::Free, now).allowed);
        let later = now + chrono::Duration::seconds(61);
        assert!(limiter.check("dev2", Tier::Free, later).allowed);
    }
}
