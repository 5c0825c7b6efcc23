//! TrajectoryPoint entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::TrajectoryPoint;
use domain::spatial::Point;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct TrajectoryPointEntity {
    pub id: i64,
    pub trajectory_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub altitude_m: Option<f64>,
}

impl TryFrom<TrajectoryPointEntity> for TrajectoryPoint {
    type Error = domain::spatial::SpatialError;

    fn try_from(e: TrajectoryPointEntity) -> Result<Self, Self::Error> {
        Ok(Self {
            id: e.id,
            trajectory_id: e.trajectory_id,
            location: Point::new(e.latitude, e.longitude)?,
            timestamp: e.timestamp,
            speed: e.speed,
            heading: e.heading,
            accuracy_m: e.accuracy_m,
            altitude_m: e.altitude_m,
        })
    }
}
