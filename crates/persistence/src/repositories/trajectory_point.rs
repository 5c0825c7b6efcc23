//! TrajectoryPoint repository for database operations.

use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::TrajectoryPointEntity;
use crate::metrics::QueryTimer;

#[derive(Clone)]
pub struct TrajectoryPointRepository {
    pool: PgPool,
}

impl TrajectoryPointRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_for_trajectory(&self, trajectory_id: Uuid, limit: i64) -> Result<Vec<TrajectoryPointEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_trajectory_points");
        let result = sqlx::query_as::<_, TrajectoryPointEntity>(
            r#"
            SELECT id, trajectory_id, latitude, longitude, timestamp, speed, heading, accuracy_m, altitude_m
            FROM trajectory_points
            WHERE trajectory_id = $1
            ORDER BY timestamp ASC
            LIMIT $2
            "#,
        )
        .bind(trajectory_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }
}
