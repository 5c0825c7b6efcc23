//! Trajectory entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::Trajectory;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct TrajectoryEntity {
    pub id: i64,
    pub trajectory_id: Uuid,
    pub device_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub point_count: i64,
    pub total_distance_m: f64,
    pub avg_speed_ms: f64,
    pub max_speed_ms: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TrajectoryEntity> for Trajectory {
    fn from(e: TrajectoryEntity) -> Self {
        Self {
            id: e.id,
            trajectory_id: e.trajectory_id,
            device_id: e.device_id,
            start_time: e.start_time,
            end_time: e.end_time,
            point_count: e.point_count,
            total_distance_m: e.total_distance_m,
            avg_speed_ms: e.avg_speed_ms,
            max_speed_ms: e.max_speed_ms,
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}
