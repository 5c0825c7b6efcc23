//! Webhook Dispatcher (C10, §4.10).
//!
//! Subscriptions live in the cache under `webhook:{user}:{geofence}` (§6),
//! not the relational store — see `domain::models::webhook`. Dispatch runs
//! on a bounded pool: attempts beyond `queue_high_water_mark` in flight are
//! shed rather than queued unbounded, and the metric `webhook_queue_depth`
//! tracks the in-flight count. Each delivery retries up to three times on
//! the fixed `{1s, 5s, 15s}` schedule and every attempt is recorded to a
//! day-keyed, 7-day-retained cache list for `GET .../webhook/stats`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use hmac::{Hmac, Mac};
use metrics::{counter, gauge};
use rand::RngCore;
use sha2::Sha256;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use cache::{self, Cache};
use domain::models::{
    CreateWebhookRequest, CreatedWebhookResponse, DeliveryAttempt, TransitionEvent, WebhookResponse,
    WebhookStatsResponse, WebhookSubscription,
};

use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// Generates a random 32-byte signing secret, hex-encoded.
fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Signs `payload` with `secret`, producing the value of the
/// `X-Webhook-Signature` header.
fn sign_payload(payload: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

const RETRY_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(15),
];

const DELIVERY_LOG_MAX_LEN: isize = 1_000;

/// `User-Agent` sent with every delivery attempt (§4.10 step 1).
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

fn subscription_key(user_id: Uuid, geofence_id: Uuid) -> String {
    format!("webhook:{user_id}:{geofence_id}")
}

fn delivery_log_key(url: &str, day: chrono::NaiveDate) -> String {
    format!("webhook_delivery:{}:{url}", day.format("%Y%m%d"))
}

fn success_status(status: u16) -> bool {
    matches!(status, 200 | 201 | 202 | 204)
}

pub struct WebhookDispatcher {
    cache: Arc<dyn Cache>,
    http: reqwest::Client,
    subscription_ttl: Duration,
    delivery_log_ttl: Duration,
    permits: Semaphore,
    queue_high_water_mark: usize,
    in_flight: AtomicUsize,
}

impl WebhookDispatcher {
    pub fn new(
        cache: Arc<dyn Cache>,
        timeout: Duration,
        worker_pool_size: usize,
        queue_high_water_mark: usize,
        subscription_ttl: Duration,
        delivery_log_ttl: Duration,
    ) -> Arc<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build webhook http client");

        Arc::new(Self {
            cache,
            http,
            subscription_ttl,
            delivery_log_ttl,
            permits: Semaphore::new(worker_pool_size.max(1)),
            queue_high_water_mark,
            in_flight: AtomicUsize::new(0),
        })
    }

    pub async fn create_subscription(
        &self,
        user_id: Uuid,
        geofence_id: Uuid,
        req: CreateWebhookRequest,
    ) -> Result<CreatedWebhookResponse, ApiError> {
        let subscription = WebhookSubscription {
            user_id,
            geofence_id,
            url: req.url,
            event_mask: req.events,
            headers: req.headers,
            active: req.active,
            secret: generate_secret(),
        };

        cache::set_json_with_ttl(
            self.cache.as_ref(),
            &subscription_key(user_id, geofence_id),
            &subscription,
            self.subscription_ttl,
        )
        .await
        .map_err(|e| ApiError::Degraded(e.to_string()))?;

        let secret = subscription.secret.clone();
        Ok(CreatedWebhookResponse {
            webhook: subscription.into(),
            secret,
        })
    }

    pub async fn get_subscription(
        &self,
        user_id: Uuid,
        geofence_id: Uuid,
    ) -> Result<Option<WebhookResponse>, ApiError> {
        let sub = cache::get_json::<WebhookSubscription>(
            self.cache.as_ref(),
            &subscription_key(user_id, geofence_id),
        )
        .await
        .map_err(|e| ApiError::Degraded(e.to_string()))?;
        Ok(sub.map(Into::into))
    }

    pub async fn delete_subscription(&self, user_id: Uuid, geofence_id: Uuid) -> Result<(), ApiError> {
        self.cache
            .delete(&subscription_key(user_id, geofence_id))
            .await
            .map_err(|e| ApiError::Degraded(e.to_string()))
    }

    /// Looks up the subscription for `(user_id, geofence_id)` and, if it
    /// wants this event type, schedules delivery on the bounded pool.
    /// Non-blocking: shedding and dispatch both happen off the ingestion
    /// critical section.
    pub async fn dispatch_if_subscribed(self: &Arc<Self>, event: TransitionEvent) {
        let key = subscription_key(event.user_id, event.geofence_id);
        let subscription = match cache::get_json::<WebhookSubscription>(self.cache.as_ref(), &key).await {
            Ok(Some(sub)) => sub,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "webhook subscription lookup failed, skipping dispatch");
                return;
            }
        };

        if !subscription.wants(event.event_type) {
            return;
        }

        if self.in_flight.load(Ordering::Relaxed) >= self.queue_high_water_mark {
            warn!(
                url = %subscription.url,
                high_water_mark = self.queue_high_water_mark,
                "webhook queue at high water mark, shedding delivery"
            );
            counter!("webhook_delivery_attempts_total", "outcome" => "shed").increment(1);
            return;
        }

        self.in_flight.fetch_add(1, Ordering::Relaxed);
        gauge!("webhook_queue_depth").set(self.in_flight.load(Ordering::Relaxed) as f64);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = this.permits.acquire().await;
            this.deliver_with_retries(&subscription, &event).await;
            this.in_flight.fetch_sub(1, Ordering::Relaxed);
            gauge!("webhook_queue_depth").set(this.in_flight.load(Ordering::Relaxed) as f64);
        });
    }

    async fn deliver_with_retries(&self, subscription: &WebhookSubscription, event: &TransitionEvent) {
        let mut attempt_index = 0usize;
        loop {
            let outcome = self.attempt_once(subscription, event).await;
            self.record_attempt(&subscription.url, &outcome).await;

            let label = if outcome.success { "success" } else { "failure" };
            counter!("webhook_delivery_attempts_total", "outcome" => label).increment(1);

            if outcome.success || attempt_index >= RETRY_SCHEDULE.len() {
                if !outcome.success {
                    warn!(url = %subscription.url, attempts = attempt_index + 1, "webhook delivery exhausted retries");
                }
                return;
            }

            tokio::time::sleep(RETRY_SCHEDULE[attempt_index]).await;
            attempt_index += 1;
        }
    }

    async fn attempt_once(&self, subscription: &WebhookSubscription, event: &TransitionEvent) -> DeliveryAttempt {
        let start = Instant::now();
        let payload = serde_json::to_string(event).unwrap_or_default();
        let signature = sign_payload(&payload, &subscription.secret);

        let mut builder = self
            .http
            .post(&subscription.url)
            .header("content-type", "application/json")
            .header("user-agent", USER_AGENT)
            .header("x-webhook-signature", signature)
            .body(payload);
        for (name, value) in &subscription.headers {
            builder = builder.header(name, value);
        }

        match builder.send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                DeliveryAttempt {
                    success: success_status(status),
                    status_code: Some(status),
                    latency_ms: start.elapsed().as_millis() as u64,
                    timestamp: Utc::now(),
                }
            }
            Err(e) => {
                info!(url = %subscription.url, error = %e, "webhook delivery attempt failed");
                DeliveryAttempt {
                    success: false,
                    status_code: None,
                    latency_ms: start.elapsed().as_millis() as u64,
                    timestamp: Utc::now(),
                }
            }
        }
    }

    async fn record_attempt(&self, url: &str, attempt: &DeliveryAttempt) {
        let key = delivery_log_key(url, attempt.timestamp.date_naive());
        let Ok(payload) = serde_json::to_string(attempt) else {
            return;
        };
        if let Err(e) = self.cache.list_push_head(&key, &payload).await {
            warn!(error = %e, "failed to record webhook delivery attempt");
            return;
        }
        let _ = self.cache.list_trim_to(&key, DELIVERY_LOG_MAX_LEN).await;
        let _ = self.cache.expire(&key, self.delivery_log_ttl).await;
    }

    /// Aggregates the day-keyed delivery logs for `url` over the last
    /// `period_days` days (§4.10, recovered from
    /// `original_source/app/services/webhook_service.py`).
    pub async fn stats(&self, url: &str, period_days: i64) -> Result<WebhookStatsResponse, ApiError> {
        let today = Utc::now().date_naive();
        let mut total = 0u64;
        let mut successful = 0u64;
        let mut latency_sum_ms = 0u128;

        for offset in 0..period_days.max(1) {
            let day = today - chrono::Duration::days(offset);
            let key = delivery_log_key(url, day);
            let entries = self
                .cache
                .list_range(&key, 0, -1)
                .await
                .map_err(|e| ApiError::Degraded(e.to_string()))?;

            for raw in entries {
                let Ok(attempt) = serde_json::from_str::<DeliveryAttempt>(&raw) else {
                    continue;
                };
                total += 1;
                latency_sum_ms += attempt.latency_ms as u128;
                if attempt.success {
                    successful += 1;
                }
            }
        }

        let failed = total.saturating_sub(successful);
        let success_rate = if total > 0 { successful as f64 / total as f64 } else { 0.0 };
        let average_response_time_ms = if total > 0 {
            latency_sum_ms as f64 / total as f64
        } else {
            0.0
        };

        Ok(WebhookStatsResponse {
            url: url.to_string(),
            period_days,
            total_attempts: total,
            successful_attempts: successful,
            failed_attempts: failed,
            success_rate,
            average_response_time_ms,
        })
    }
}
