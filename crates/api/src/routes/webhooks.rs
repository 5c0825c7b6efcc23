//! Webhook subscription management routes (§4.10, §6).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use domain::models::{
    CreateWebhookRequest, CreatedWebhookResponse, WebhookResponse, WebhookStatsQuery,
    WebhookStatsResponse,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserId;

/// `POST /geofences/{id}/webhook` (§6): the signing secret is returned once,
/// here, and never again (§4.10).
pub async fn create_webhook(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(geofence_id): Path<Uuid>,
    Json(req): Json<CreateWebhookRequest>,
) -> Result<(StatusCode, Json<CreatedWebhookResponse>), ApiError> {
    req.validate()?;

    state
        .store
        .find_geofence(user_id, geofence_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("geofence not found".into()))?;

    let created = state.webhooks.create_subscription(user_id, geofence_id, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /geofences/{id}/webhook` (§6).
pub async fn get_webhook(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(geofence_id): Path<Uuid>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let webhook = state
        .webhooks
        .get_subscription(user_id, geofence_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("webhook not found".into()))?;
    Ok(Json(webhook))
}

/// `DELETE /geofences/{id}/webhook` (§6).
pub async fn delete_webhook(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(geofence_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.webhooks.delete_subscription(user_id, geofence_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /geofences/{id}/webhook/stats` (§11 supplemented feature, recovered
/// from `original_source/app/services/webhook_service.py`'s delivery
/// tracker).
pub async fn get_webhook_stats(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(geofence_id): Path<Uuid>,
    Query(query): Query<WebhookStatsQuery>,
) -> Result<Json<WebhookStatsResponse>, ApiError> {
    let webhook = state
        .webhooks
        .get_subscription(user_id, geofence_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("webhook not found".into()))?;

    let stats = state.webhooks.stats(&webhook.url, query.days.max(1)).await?;
    Ok(Json(stats))
}
