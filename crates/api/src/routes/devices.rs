//! Device registration, location ingestion, and query routes (§4.1, §4.8,
//! §4.11).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use domain::models::{
    BulkLocationRequest, BulkLocationResponse, CreateDeviceRequest, DeviceResponse,
    LocationUpdateResult, NearbyDeviceResponse, NearbyDevicesRequest, StatsQuery,
    TrajectoryQuery, TrajectoryResponse, UpdateLocationRequest,
};
use domain::services::admission::limits_for;
use domain::spatial::Point;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::{resolve_tier, UserId};
use crate::services::ingestion::LocationSample;

/// `POST /devices` (§6): creates a device, rejecting with 402 once the
/// caller's tier quota (`max_devices`, §4.4) is already met.
pub async fn create_device(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    headers: axum::http::HeaderMap,
    Json(req): Json<CreateDeviceRequest>,
) -> Result<(StatusCode, Json<DeviceResponse>), ApiError> {
    req.validate()?;

    let tier = resolve_tier(&headers);
    let limits = limits_for(tier);
    let existing = state.store.count_devices(user_id).await?;
    if existing >= limits.max_devices as i64 {
        return Err(ApiError::QuotaExceeded(format!(
            "tier allows at most {} devices",
            limits.max_devices
        )));
    }

    let device = state
        .store
        .create_device(user_id, &req.name, req.external_id.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(device.into())))
}

/// `PUT /devices/{id}/location` (§6, §4.8).
pub async fn update_location(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(device_id): Path<Uuid>,
    Json(req): Json<UpdateLocationRequest>,
) -> Result<Json<LocationUpdateResult>, ApiError> {
    req.validate()?;

    let point = Point::new(req.latitude, req.longitude)
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    let sample = LocationSample {
        point,
        timestamp: req.timestamp.unwrap_or_else(Utc::now),
        speed: req.speed,
        heading: req.heading,
        accuracy_m: req.accuracy,
        altitude_m: req.altitude,
    };

    let result = state.ingestion.ingest_location(user_id, device_id, sample).await?;
    Ok(Json(result))
}

/// `POST /devices/locations/bulk` (§6, §4.11). Per-item failures are
/// reported in the body rather than failing the whole request.
pub async fn bulk_update_locations(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(req): Json<BulkLocationRequest>,
) -> Result<Json<BulkLocationResponse>, ApiError> {
    req.validate()?;

    let response = state.ingestion.ingest_bulk(user_id, req.locations).await;
    Ok(Json(response))
}

/// `GET /devices/{id}/trajectory` (§6, §4.7).
pub async fn get_trajectory(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(device_id): Path<Uuid>,
    Query(query): Query<TrajectoryQuery>,
) -> Result<Json<Vec<TrajectoryResponse>>, ApiError> {
    state
        .store
        .find_device(user_id, device_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("device not found".into()))?;

    let trajectories = state
        .store
        .trajectories_for_device(device_id, query.start_time, query.end_time, query.limit)
        .await?;

    Ok(Json(trajectories.into_iter().map(Into::into).collect()))
}

/// `GET /devices/{id}/stats` (§6).
pub async fn get_device_stats(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(device_id): Path<Uuid>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<domain::models::DeviceStats>, ApiError> {
    state
        .store
        .find_device(user_id, device_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("device not found".into()))?;

    let since = Utc::now() - Duration::days(query.days.max(1));
    let stats = state.store.device_stats(device_id, since).await?;
    Ok(Json(stats))
}

/// `POST /devices/nearby` (§6, §4.2 `bulk_distance_point_to_many`/`nearby_devices`).
pub async fn nearby_devices(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(req): Json<NearbyDevicesRequest>,
) -> Result<Json<Vec<NearbyDeviceResponse>>, ApiError> {
    req.validate()?;

    let point = Point::new(req.latitude, req.longitude)
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    let found = state
        .store
        .nearby_devices(user_id, point, req.radius_meters, req.limit)
        .await?;

    Ok(Json(
        found
            .into_iter()
            .map(|(device, distance_m)| NearbyDeviceResponse { device: device.into(), distance_m })
            .collect(),
    ))
}
