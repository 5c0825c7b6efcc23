//! Device domain model and request/response DTOs.

use crate::spatial::Point;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A tracked device owned by a user. `last_point`/`last_seen` are
/// maintained exclusively by the ingestion pipeline (§4.8); `last_seen` is
/// invariant to be monotonically non-decreasing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: i64,
    pub device_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    /// Optional identifier supplied by the owner, unique system-wide when present.
    pub external_id: Option<String>,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_point: Option<Point>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// True if `ts` is acceptable under the ordering policy (§4.8 step 4):
    /// no prior location, or `ts >= last_seen` (equal timestamps are
    /// accepted as idempotent replays).
    pub fn accepts_timestamp(&self, ts: DateTime<Utc>) -> bool {
        match self.last_seen {
            Some(last_seen) => ts >= last_seen,
            None => true,
        }
    }

    /// True if `ts` is strictly a replay of the last observed update.
    pub fn is_replay(&self, ts: DateTime<Utc>) -> bool {
        self.last_seen == Some(ts)
    }
}

/// `POST /devices` request body.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeviceRequest {
    #[validate(length(min = 1, max = 120, message = "name must be 1-120 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 200, message = "external_id must be 1-200 characters"))]
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub device_id: Uuid,
    pub name: String,
    pub external_id: Option<String>,
    pub active: bool,
    pub last_latitude: Option<f64>,
    pub last_longitude: Option<f64>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Device> for DeviceResponse {
    fn from(d: Device) -> Self {
        Self {
            device_id: d.device_id,
            name: d.name,
            external_id: d.external_id,
            active: d.active,
            last_latitude: d.last_point.map(|p| p.lat),
            last_longitude: d.last_point.map(|p| p.lon),
            last_seen: d.last_seen,
            created_at: d.created_at,
        }
    }
}

/// Body of `PUT /devices/{id}/location`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationRequest {
    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub latitude: f64,
    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub longitude: f64,
    pub timestamp: Option<DateTime<Utc>>,
    #[validate(range(min = 0.0, message = "speed must be non-negative"))]
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    #[validate(range(min = 0.0, message = "accuracy must be non-negative"))]
    pub accuracy: Option<f64>,
    pub altitude: Option<f64>,
    pub metadata: Option<serde_json::Value>,
}

/// Result of a single location update, mirrored in the per-item entries of
/// a bulk response (§4.8).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdateResult {
    pub device_id: Uuid,
    pub current_members: Vec<Uuid>,
    pub trajectory_id: Uuid,
}

/// `POST /devices/nearby` request body.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NearbyDevicesRequest {
    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub latitude: f64,
    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub longitude: f64,
    #[validate(range(min = 0.0, max = 50_000.0, message = "radius_meters must be between 0 and 50000"))]
    pub radius_meters: f64,
    #[serde(default = "default_nearby_limit")]
    #[validate(range(min = 1, max = 200, message = "limit must be between 1 and 200"))]
    pub limit: i64,
}

fn default_nearby_limit() -> i64 {
    20
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyDeviceResponse {
    #[serde(flatten)]
    pub device: DeviceResponse,
    pub distance_m: f64,
}
