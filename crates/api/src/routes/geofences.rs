//! Geofence CRUD, containment, and proximity routes (§4.1, §4.5, §6).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use domain::models::{
    CheckPointRequest, CreateGeofenceRequest, GeofenceResponse, NearbyGeofenceQuery,
    UpdateGeofenceRequest, GEOFENCE_MUTATION_CHANNEL,
};
use domain::services::admission::limits_for;
use domain::spatial::Point;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::{resolve_tier, UserId};

/// Notifies every replica's Geofence Index that `user_id`'s geofences
/// changed, so each invalidates its own copy and rebuilds on next lookup
/// (§4.5). Best-effort: a publish failure only means a slower-to-converge
/// index elsewhere, never a failed mutation here.
async fn publish_geofence_mutation(state: &AppState, user_id: Uuid) {
    if let Err(e) = state.cache.publish(GEOFENCE_MUTATION_CHANNEL, &user_id.to_string()).await {
        tracing::warn!(error = %e, %user_id, "failed to publish geofence mutation notification");
    }
}

/// `POST /geofences` (§6): rejects with 402 once the caller's tier quota
/// (`max_geofences`, §4.4) is already met.
pub async fn create_geofence(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    headers: axum::http::HeaderMap,
    Json(req): Json<CreateGeofenceRequest>,
) -> Result<(StatusCode, Json<GeofenceResponse>), ApiError> {
    req.validate()?;

    let tier = resolve_tier(&headers);
    let limits = limits_for(tier);
    let existing = state.store.count_geofences(user_id).await?;
    if existing >= limits.max_geofences as i64 {
        return Err(ApiError::QuotaExceeded(format!(
            "tier allows at most {} geofences",
            limits.max_geofences
        )));
    }

    let polygon = req
        .shape
        .to_polygon(state.config.core.polygon_approx_n)
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    let geofence = state
        .store
        .create_geofence(user_id, &req.name, &polygon, req.metadata)
        .await?;

    if geofence.active {
        state.geofence_index.upsert(user_id, geofence.clone());
    }
    publish_geofence_mutation(&state, user_id).await;

    Ok((StatusCode::CREATED, Json(geofence.into())))
}

/// `GET /geofences/{id}` (§6).
pub async fn get_geofence(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(geofence_id): Path<Uuid>,
) -> Result<Json<GeofenceResponse>, ApiError> {
    let geofence = state
        .store
        .find_geofence(user_id, geofence_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("geofence not found".into()))?;
    Ok(Json(geofence.into()))
}

/// `PUT /geofences/{id}` (§6): partial update of name/active/metadata. The
/// shape itself is immutable once created (§9 open question, resolved in
/// favour of delete-and-recreate for geometry changes).
pub async fn update_geofence(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(geofence_id): Path<Uuid>,
    Json(req): Json<UpdateGeofenceRequest>,
) -> Result<Json<GeofenceResponse>, ApiError> {
    req.validate()?;

    let geofence = state
        .store
        .update_geofence(user_id, geofence_id, req.name.as_deref(), req.active, req.metadata)
        .await?
        .ok_or_else(|| ApiError::NotFound("geofence not found".into()))?;

    if geofence.active {
        state.geofence_index.upsert(user_id, geofence.clone());
    } else {
        state.geofence_index.remove(user_id, geofence_id);
    }
    publish_geofence_mutation(&state, user_id).await;

    Ok(Json(geofence.into()))
}

/// `DELETE /geofences/{id}` (§6).
pub async fn delete_geofence(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(geofence_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = state.store.delete_geofence(user_id, geofence_id).await?;
    if !deleted {
        return Err(ApiError::NotFound("geofence not found".into()));
    }
    state.geofence_index.remove(user_id, geofence_id);
    publish_geofence_mutation(&state, user_id).await;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /geofences/check` (§6): containment for an arbitrary point against
/// the caller's own geofences, without a device.
pub async fn check_point(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(req): Json<CheckPointRequest>,
) -> Result<Json<Vec<GeofenceResponse>>, ApiError> {
    req.validate()?;
    let point = Point::new(req.latitude, req.longitude)
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    let containing = state.store.geofences_containing(user_id, point).await?;
    Ok(Json(containing.into_iter().map(Into::into).collect()))
}

/// `GET /geofences/containing/point` (§6): same predicate as `check_point`,
/// exposed as a query-string `GET` for callers that prefer cacheable reads.
pub async fn containing_point(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(query): Query<CheckPointRequest>,
) -> Result<Json<Vec<GeofenceResponse>>, ApiError> {
    query.validate()?;
    let point = Point::new(query.latitude, query.longitude)
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    let containing = state.store.geofences_containing(user_id, point).await?;
    Ok(Json(containing.into_iter().map(Into::into).collect()))
}

/// `GET /geofences/nearby/point` (§6).
pub async fn nearby_point(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(query): Query<NearbyGeofenceQuery>,
) -> Result<Json<Vec<GeofenceResponse>>, ApiError> {
    query.validate()?;
    let point = Point::new(query.latitude, query.longitude)
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    let nearby = state
        .store
        .geofences_near(user_id, point, query.radius_meters, query.limit)
        .await?;
    Ok(Json(nearby.into_iter().map(Into::into).collect()))
}
