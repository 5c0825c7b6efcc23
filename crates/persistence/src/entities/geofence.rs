//! Geofence entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::Geofence;
use domain::spatial::{Point, Polygon};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the `geofences` table. `vertices` is stored as
/// JSONB (`[[lat, lon], ...]`), closed ring — there is no PostGIS
/// dependency here, matching the Store Adapter's "no SQL in prose" C1
/// fallback contract.
#[derive(Debug, Clone, FromRow)]
pub struct GeofenceEntity {
    pub id: i64,
    pub geofence_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub vertices: serde_json::Value,
    pub active: bool,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GeofenceEntity {
    pub fn encode_vertices(polygon: &Polygon) -> serde_json::Value {
        serde_json::Value::Array(
            polygon
                .vertices
                .iter()
                .map(|p| serde_json::json!([p.lat, p.lon]))
                .collect(),
        )
    }
}

impl TryFrom<GeofenceEntity> for Geofence {
    type Error = domain::spatial::SpatialError;

    fn try_from(e: GeofenceEntity) -> Result<Self, Self::Error> {
        let pairs: Vec<(f64, f64)> = serde_json::from_value(e.vertices).unwrap_or_default();
        let points = pairs
            .into_iter()
            .map(|(lat, lon)| Point::new(lat, lon))
            .collect::<Result<Vec<_>, _>>()?;
        let shape = Polygon::new(points)?;
        Ok(Self {
            id: e.id,
            geofence_id: e.geofence_id,
            user_id: e.user_id,
            name: e.name,
            shape,
            active: e.active,
            metadata: e.metadata,
            created_at: e.created_at,
            updated_at: e.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        Polygon::new(vec![
            Point::new(0.0, 0.0).unwrap(),
            Point::new(0.0, 1.0).unwrap(),
            Point::new(1.0, 1.0).unwrap(),
            Point::new(1.0, 0.0).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_encode_decode_vertices_round_trip() {
        let shape = square();
        let entity = GeofenceEntity {
            id: 1,
            geofence_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "home".into(),
            vertices: GeofenceEntity::encode_vertices(&shape),
            active: true,
            metadata: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let geofence: Geofence = entity.try_into().unwrap();
        assert_eq!(geofence.shape.vertices.len(), shape.vertices.len());
    }
}
