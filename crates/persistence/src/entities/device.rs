//! Device entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::spatial::Point;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the `devices` table. `last_latitude`/
/// `last_longitude` are nullable companions rather than a composite type —
/// Postgres has no native point type we rely on here, keeping the store
/// swappable without a PostGIS dependency.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceEntity {
    pub id: i64,
    pub device_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub external_id: Option<String>,
    pub active: bool,
    pub last_latitude: Option<f64>,
    pub last_longitude: Option<f64>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DeviceEntity> for domain::models::Device {
    fn from(e: DeviceEntity) -> Self {
        let last_point = match (e.last_latitude, e.last_longitude) {
            (Some(lat), Some(lon)) => Point::new(lat, lon).ok(),
            _ => None,
        };
        Self {
            id: e.id,
            device_id: e.device_id,
            user_id: e.user_id,
            name: e.name,
            external_id: e.external_id,
            active: e.active,
            last_point,
            last_seen: e.last_seen,
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> DeviceEntity {
        DeviceEntity {
            id: 1,
            device_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "phone".into(),
            external_id: None,
            active: true,
            last_latitude: Some(52.5),
            last_longitude: Some(13.4),
            last_seen: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_entity_to_domain_reconstructs_point() {
        let e = entity();
        let device: domain::models::Device = e.into();
        assert_eq!(device.last_point.unwrap().lat, 52.5);
    }

    #[test]
    fn test_entity_to_domain_none_point_when_missing() {
        let mut e = entity();
        e.last_latitude = None;
        let device: domain::models::Device = e.into();
        assert!(device.last_point.is_none());
    }
}
