//! Admission Controller HTTP integration (C4, §4.4, §11).
//!
//! Wraps `domain::services::admission::check_admission` around a cache-backed
//! `WindowCounter` (sorted sets keyed per identifier/window), sets the
//! `X-RateLimit-*` response headers on every response, and turns a denial
//! into `ApiError::RateLimited` with `Retry-After`.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use async_trait::async_trait;

use cache::Cache;
use chrono::Utc;
use domain::services::admission::{
    check_admission, AdmissionCacheError, AdmissionDecision, WindowCounter,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::{resolve_tier, AdmissionIdentity};

/// `WindowCounter` backed by the cache's sorted-set primitives: one zset per
/// `(identifier, window)`, scored by admission timestamp in milliseconds.
pub struct CacheWindowCounter {
    cache: Arc<dyn Cache>,
}

impl CacheWindowCounter {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl WindowCounter for CacheWindowCounter {
    async fn prune_count_and_maybe_admit(
        &self,
        key: &str,
        now_ms: i64,
        cutoff_ms: i64,
        window_secs: i64,
        limit: u32,
        admit: bool,
    ) -> Result<(u32, bool), AdmissionCacheError> {
        self.cache
            .zset_remove_range_by_score(key, f64::MIN, cutoff_ms as f64)
            .await
            .map_err(|e| AdmissionCacheError(e.to_string()))?;

        let count = self
            .cache
            .zset_count(key, cutoff_ms as f64, f64::MAX)
            .await
            .map_err(|e| AdmissionCacheError(e.to_string()))?;

        if !admit || count >= limit as u64 {
            return Ok((count as u32, false));
        }

        let member = format!("{now_ms}:{}", uuid::Uuid::new_v4());
        self.cache
            .zset_add(key, &member, now_ms as f64)
            .await
            .map_err(|e| AdmissionCacheError(e.to_string()))?;
        self.cache
            .expire(key, std::time::Duration::from_secs(window_secs as u64 + 1))
            .await
            .map_err(|e| AdmissionCacheError(e.to_string()))?;

        Ok((count as u32 + 1, true))
    }

    async fn oldest_score_ms(&self, key: &str) -> Result<Option<i64>, AdmissionCacheError> {
        let score = self
            .cache
            .zset_min_score(key)
            .await
            .map_err(|e| AdmissionCacheError(e.to_string()))?;
        Ok(score.map(|s| s as i64))
    }
}

fn header_value(n: u64) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

fn apply_headers(response: &mut Response, decision: &AdmissionDecision) {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", header_value(decision.limit as u64));
    headers.insert(
        "x-ratelimit-remaining",
        header_value(decision.remaining as u64),
    );
    if decision.retry_after_s > 0 {
        headers.insert("x-ratelimit-reset", header_value(decision.retry_after_s as u64));
    }
}

/// Admission control middleware (§4.4, §10.7): evaluated after security
/// headers and the request timeout, before routing.
pub async fn admission_middleware(
    State(state): State<AppState>,
    identity: AdmissionIdentity,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let tier = resolve_tier(req.headers());
    let now = Utc::now();

    let decision = match check_admission(state.window_counter.as_ref(), &identity.identifier, tier, now).await {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!(
                error = %e,
                identifier = %identity.identifier,
                "admission controller cache error, falling back to in-process window (degraded mode)"
            );
            state.degraded_limiter.check(&identity.identifier, tier, now)
        }
    };

    if !decision.allowed {
        let retry_after_s = decision.retry_after_s.max(1) as u64;
        return Err(ApiError::RateLimited { retry_after_s });
    }

    let mut response = next.run(req).await;
    apply_headers(&mut response, &decision);
    Ok(response)
}
