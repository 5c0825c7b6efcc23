//! WebhookSubscription domain model (§3, §4.10): a per-(user, geofence)
//! HTTP sink notified on enter/exit transitions.

use crate::models::geofence::EventType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// A registered webhook. Stored in the cache under `webhook:{user}:{geofence}`
/// (§6) rather than the relational store, since it is looked up on the hot
/// ingestion path and tolerates the cache's TTL-based lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSubscription {
    pub user_id: Uuid,
    pub geofence_id: Uuid,
    pub url: String,
    pub event_mask: Vec<EventType>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub active: bool,
    /// HMAC-SHA256 signing secret for the `X-Webhook-Signature` header
    /// (§4.10, recovered from `original_source`'s webhook delivery
    /// signing). Generated server-side on creation if not supplied.
    pub secret: String,
}

impl WebhookSubscription {
    pub fn wants(&self, event_type: EventType) -> bool {
        self.active && self.event_mask.contains(&event_type)
    }
}

/// `POST /geofences/{id}/webhook` request body.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebhookRequest {
    #[validate(custom(function = "validate_webhook_url"))]
    pub url: String,
    #[validate(length(min = 1, message = "events must not be empty"))]
    pub events: Vec<EventType>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// `GET /geofences/{id}/webhook` response. The signing secret is write-only
/// (returned once, on creation) and never echoed back here.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedWebhookResponse {
    #[serde(flatten)]
    pub webhook: WebhookResponse,
    pub secret: String,
}

fn default_active() -> bool {
    true
}

/// `GET /geofences/{id}/webhook/stats` query parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookStatsQuery {
    #[serde(default = "default_stats_period_days")]
    pub days: i64,
}

fn default_stats_period_days() -> i64 {
    7
}

fn validate_webhook_url(url: &str) -> Result<(), ValidationError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        let mut err = ValidationError::new("url_scheme");
        err.message = Some("url must start with http:// or https://".into());
        Err(err)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub geofence_id: Uuid,
    pub url: String,
    pub events: Vec<EventType>,
    pub headers: HashMap<String, String>,
    pub active: bool,
}

impl From<WebhookSubscription> for WebhookResponse {
    fn from(w: WebhookSubscription) -> Self {
        Self {
            geofence_id: w.geofence_id,
            url: w.url,
            events: w.event_mask,
            headers: w.headers,
            active: w.active,
        }
    }
}

/// Stats surface recovered from `original_source/app/services/webhook_service.py`
/// (`WebhookDeliveryTracker.get_delivery_stats`), computed from the
/// day-keyed `DeliveryAttempt` cache lists.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WebhookStatsResponse {
    pub url: String,
    pub period_days: i64,
    pub total_attempts: u64,
    pub successful_attempts: u64,
    pub failed_attempts: u64,
    pub success_rate: f64,
    pub average_response_time_ms: f64,
}
