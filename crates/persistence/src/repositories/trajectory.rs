//! Trajectory repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::TrajectoryEntity;
use crate::metrics::QueryTimer;

#[derive(Clone)]
pub struct TrajectoryRepository {
    pool: PgPool,
}

impl TrajectoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finds the most recently started trajectory for a device that is
    /// still open (§4.7 `GAP_THRESHOLD`), regardless of executor context —
    /// callers within an ingest transaction should prefer the `*_tx`
    /// variants on `PostgresIngestTx` instead.
    pub async fn find_latest_for_device(&self, device_id: Uuid) -> Result<Option<TrajectoryEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_latest_trajectory");
        let result = sqlx::query_as::<_, TrajectoryEntity>(
            r#"
            SELECT id, trajectory_id, device_id, start_time, end_time, point_count,
                   total_distance_m, avg_speed_ms, max_speed_ms, created_at, updated_at
            FROM trajectories
            WHERE device_id = $1
            ORDER BY start_time DESC
            LIMIT 1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_for_device(
        &self,
        device_id: Uuid,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<TrajectoryEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_trajectories_for_device");
        let result = sqlx::query_as::<_, TrajectoryEntity>(
            r#"
            SELECT id, trajectory_id, device_id, start_time, end_time, point_count,
                   total_distance_m, avg_speed_ms, max_speed_ms, created_at, updated_at
            FROM trajectories
            WHERE device_id = $1
              AND ($2::timestamptz IS NULL OR start_time >= $2)
              AND ($3::timestamptz IS NULL OR end_time <= $3)
            ORDER BY start_time DESC
            LIMIT $4
            "#,
        )
        .bind(device_id)
        .bind(start_time)
        .bind(end_time)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn stats_since(&self, device_id: Uuid, since: DateTime<Utc>) -> Result<(i64, f64, f64), sqlx::Error> {
        let timer = QueryTimer::new("trajectory_stats_since");
        let row: (Option<i64>, Option<f64>, Option<f64>) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(total_distance_m), 0.0), COALESCE(MAX(max_speed_ms), 0.0)
            FROM trajectories
            WHERE device_id = $1 AND start_time >= $2
            "#,
        )
        .bind(device_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        timer.record();
        Ok((row.0.unwrap_or(0), row.1.unwrap_or(0.0), row.2.unwrap_or(0.0)))
    }
}
