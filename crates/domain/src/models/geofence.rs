//! Geofence domain model: a user-owned region tested for spatial
//! containment of device points (§3, §4.1).

use crate::spatial::{circle_to_polygon, contains, Point, Polygon, SpatialError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Enter/exit event mask entry. Dwell is not part of this spec's transition
/// model (only membership-set symmetric difference is tracked, §8), so only
/// the two transition types are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Enter,
    Exit,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "enter" => Some(Self::Enter),
            "exit" => Some(Self::Exit),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source representation of a geofence's geometry as submitted by the
/// owner. A circle is normalised to a polygon at ingest time (§4.1, §9) so
/// downstream code (the Geofence Index, containment checks) handles a
/// single shape family; the original `(center, radius)` is not recoverable
/// from a `GET` afterwards (§9 open question, accepted lossy round-trip).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapeInput {
    Polygon {
        #[serde(rename = "vertices")]
        points: Vec<(f64, f64)>,
    },
    Circle {
        center_lat: f64,
        center_lon: f64,
        radius_m: f64,
    },
}

impl ShapeInput {
    /// Minimum circle radius, meters (§4.4-adjacent validation used by the
    /// teacher's circle-only geofence; kept as the sane lower bound here).
    pub const MIN_RADIUS_M: f64 = 20.0;
    pub const MAX_RADIUS_M: f64 = 50_000.0;

    pub fn to_polygon(&self, polygon_approx_n: usize) -> Result<Polygon, SpatialError> {
        match self {
            ShapeInput::Polygon { points } => {
                let verts = points
                    .iter()
                    .map(|&(lat, lon)| Point::new(lat, lon))
                    .collect::<Result<Vec<_>, _>>()?;
                Polygon::new(verts)
            }
            ShapeInput::Circle { center_lat, center_lon, radius_m } => {
                let center = Point::new(*center_lat, *center_lon)?;
                circle_to_polygon(center, *radius_m, polygon_approx_n)
            }
        }
    }
}

/// A user-owned geofence. `shape` is always a polygon (circles are
/// approximated at creation time); `active` geofences participate in the
/// Geofence Index (C5) and admission quotas.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Geofence {
    pub id: i64,
    pub geofence_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub shape: Polygon,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Geofence {
    pub fn contains_point(&self, point: Point) -> bool {
        contains(&self.shape, point)
    }
}

/// `POST /geofences` request body.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateGeofenceRequest {
    #[validate(length(min = 1, max = 120, message = "name must be 1-120 characters"))]
    pub name: String,
    #[validate(custom(function = "validate_shape"))]
    pub shape: ShapeInput,
    pub metadata: Option<serde_json::Value>,
}

fn validate_shape(shape: &ShapeInput) -> Result<(), ValidationError> {
    match shape {
        ShapeInput::Circle { center_lat, center_lon, radius_m } => {
            shared::validation::validate_latitude(*center_lat)?;
            shared::validation::validate_longitude(*center_lon)?;
            if !(ShapeInput::MIN_RADIUS_M..=ShapeInput::MAX_RADIUS_M).contains(radius_m) {
                let mut err = ValidationError::new("radius_range");
                err.message = Some("radius_m must be between 20 and 50000".into());
                return Err(err);
            }
            Ok(())
        }
        ShapeInput::Polygon { points } => {
            if points.len() < 3 {
                let mut err = ValidationError::new("polygon_too_small");
                err.message = Some("polygon must have at least 3 vertices".into());
                return Err(err);
            }
            for &(lat, lon) in points {
                shared::validation::validate_latitude(lat)?;
                shared::validation::validate_longitude(lon)?;
            }
            Ok(())
        }
    }
}

/// `PUT /geofences/{id}` request body — all fields optional (partial update).
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGeofenceRequest {
    #[validate(length(min = 1, max = 120, message = "name must be 1-120 characters"))]
    pub name: Option<String>,
    pub active: Option<bool>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceResponse {
    pub geofence_id: Uuid,
    pub name: String,
    pub vertices: Vec<(f64, f64)>,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<Geofence> for GeofenceResponse {
    fn from(g: Geofence) -> Self {
        Self {
            geofence_id: g.geofence_id,
            name: g.name,
            vertices: g.shape.vertices.iter().map(|p| (p.lat, p.lon)).collect(),
            active: g.active,
            metadata: g.metadata,
            created_at: g.created_at,
        }
    }
}

/// `POST /geofences/check` request: evaluate containment for an arbitrary
/// point without a device, against the caller's own geofences.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckPointRequest {
    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub latitude: f64,
    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub longitude: f64,
}

/// `GET /geofences/nearby/point` query parameters.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NearbyGeofenceQuery {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trip() {
        assert_eq!(EventType::parse("ENTER"), Some(EventType::Enter));
        assert_eq!(EventType::parse("exit"), Some(EventType::Exit));
        assert_eq!(EventType::parse("dwell"), None);
    }

    #[test]
    fn test_circle_shape_to_polygon() {
        let shape = ShapeInput::Circle { center_lat: 52.5, center_lon: 13.4, radius_m: 500.0 };
        let polygon = shape.to_polygon(32).unwrap();
        assert!(contains(&polygon, Point::new(52.5, 13.4).unwrap()));
    }

    #[test]
    fn test_polygon_shape_rejects_two_points() {
        let shape = ShapeInput::Polygon { points: vec![(0.0, 0.0), (1.0, 1.0)] };
        let req = CreateGeofenceRequest { name: "x".into(), shape, metadata: None };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_circle_radius_boundaries() {
        let too_small = ShapeInput::Circle { center_lat: 0.0, center_lon: 0.0, radius_m: 19.0 };
        assert!(validate_shape(&too_small).is_err());
        let too_big = ShapeInput::Circle { center_lat: 0.0, center_lon: 0.0, radius_m: 50_001.0 };
        assert!(validate_shape(&too_big).is_err());
        let ok = ShapeInput::Circle { center_lat: 0.0, center_lon: 0.0, radius_m: 50_000.0 };
        assert!(validate_shape(&ok).is_ok());
    }

    #[test]
    fn test_geofence_response_round_trips_vertices() {
        let shape = ShapeInput::Polygon {
            points: vec![(52.5, 13.3), (52.55, 13.3), (52.55, 13.45), (52.5, 13.45)],
        };
        let polygon = shape.to_polygon(32).unwrap();
        let g = Geofence {
            id: 1,
            geofence_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "home".into(),
            shape: polygon.clone(),
            active: true,
            metadata: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let resp: GeofenceResponse = g.into();
        assert_eq!(resp.vertices.len(), polygon.vertices.len());
    }
}
