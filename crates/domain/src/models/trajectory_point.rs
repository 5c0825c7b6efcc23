//! TrajectoryPoint domain model: one persisted telemetry sample belonging
//! to a trajectory (§3). Also doubles as the request body shape for a
//! single location update, since both carry the same telemetry fields.

use crate::spatial::Point;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryPoint {
    pub id: i64,
    pub trajectory_id: Uuid,
    pub location: Point,
    pub timestamp: DateTime<Utc>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub altitude_m: Option<f64>,
}

/// A validated, clamped telemetry sample ready to be appended by C7. Built
/// by the ingestion pipeline from the raw request after coordinate/range
/// validation and heading clamping (§4.8 step 3).
#[derive(Debug, Clone)]
pub struct NewTrajectoryPoint {
    pub location: Point,
    pub timestamp: DateTime<Utc>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub altitude_m: Option<f64>,
}

/// One item of `POST /devices/locations/bulk`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkLocationItem {
    pub device_id: Uuid,
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
}

/// Upper bound on items accepted by the bulk endpoint (§5, §8 boundary test:
/// 1000 accepted, 1001 rejected).
pub const MAX_BULK_ITEMS: usize = 1000;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkLocationRequest {
    #[validate(length(min = 1, max = 1000, message = "locations must contain 1-1000 items"))]
    #[validate(nested)]
    pub locations: Vec<BulkLocationItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkLocationFailure {
    pub device_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BulkLocationResponse {
    pub successful: Vec<Uuid>,
    pub failed: Vec<BulkLocationFailure>,
    pub total: usize,
}

/// Clamps `heading` into `[0, 360)` per §4.8 step 3, wrapping negative and
/// out-of-range values rather than rejecting them.
pub fn clamp_heading(heading: f64) -> f64 {
    let wrapped = heading % 360.0;
    if wrapped < 0.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_heading_in_range() {
        assert_eq!(clamp_heading(45.0), 45.0);
    }

    #[test]
    fn test_clamp_heading_wraps_over() {
        assert_eq!(clamp_heading(370.0), 10.0);
    }

    #[test]
    fn test_clamp_heading_wraps_negative() {
        assert_eq!(clamp_heading(-10.0), 350.0);
    }

    #[test]
    fn test_clamp_heading_boundary_360() {
        assert_eq!(clamp_heading(360.0), 0.0);
    }

    #[test]
    fn test_bulk_request_rejects_over_limit() {
        let items: Vec<BulkLocationItem> = (0..1001)
            .map(|_| BulkLocationItem {
                device_id: Uuid::new_v4(),
                latitude: 0.0,
                longitude: 0.0,
                timestamp: None,
                speed: None,
                heading: None,
                accuracy: None,
                altitude: None,
            })
            .collect();
        let req = BulkLocationRequest { locations: items };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_bulk_request_accepts_max_size() {
        let items: Vec<BulkLocationItem> = (0..MAX_BULK_ITEMS)
            .map(|_| BulkLocationItem {
                device_id: Uuid::new_v4(),
                latitude: 0.0,
                longitude: 0.0,
                timestamp: None,
                speed: None,
                heading: None,
                accuracy: None,
                altitude: None,
            })
            .collect();
        let req = BulkLocationRequest { locations: items };
        assert!(req.validate().is_ok());
    }
}
