//! Device repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::DeviceEntity;
use crate::metrics::QueryTimer;

#[derive(Clone)]
pub struct DeviceRepository {
    pool: PgPool,
}

impl DeviceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn find_by_device_id(&self, user_id: Uuid, device_id: Uuid) -> Result<Option<DeviceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_device_by_id");
        let result = sqlx::query_as::<_, DeviceEntity>(
            r#"
            SELECT id, device_id, user_id, name, external_id, active,
                   last_latitude, last_longitude, last_seen, created_at, updated_at
            FROM devices
            WHERE user_id = $1 AND device_id = $2
            "#,
        )
        .bind(user_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_by_external_id(&self, user_id: Uuid, external_id: &str) -> Result<Option<DeviceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_device_by_external_id");
        let result = sqlx::query_as::<_, DeviceEntity>(
            r#"
            SELECT id, device_id, user_id, name, external_id, active,
                   last_latitude, last_longitude, last_seen, created_at, updated_at
            FROM devices
            WHERE user_id = $1 AND external_id = $2
            "#,
        )
        .bind(user_id)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn create(&self, user_id: Uuid, name: &str, external_id: Option<&str>) -> Result<DeviceEntity, sqlx::Error> {
        let now = Utc::now();
        let timer = QueryTimer::new("create_device");
        let result = sqlx::query_as::<_, DeviceEntity>(
            r#"
            INSERT INTO devices (device_id, user_id, name, external_id, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, true, $5, $5)
            RETURNING id, device_id, user_id, name, external_id, active,
                      last_latitude, last_longitude, last_seen, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(name)
        .bind(external_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn count_for_user(&self, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM devices WHERE user_id = $1 AND active = true")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Conditional location upsert per §4.2: applies only if
    /// `seen_at > last_seen OR last_seen IS NULL`. Returns whether the
    /// write applied.
    pub async fn upsert_location(&self, device_id: Uuid, lat: f64, lon: f64, seen_at: DateTime<Utc>) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("upsert_device_location");
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET last_latitude = $2, last_longitude = $3, last_seen = $4, updated_at = $4
            WHERE device_id = $1 AND (last_seen IS NULL OR $4 > last_seen)
            "#,
        )
        .bind(device_id)
        .bind(lat)
        .bind(lon)
        .bind(seen_at)
        .execute(&self.pool)
        .await;
        timer.record();
        Ok(result?.rows_affected() > 0)
    }

    pub async fn nearby(&self, user_id: Uuid, lat: f64, lon: f64, radius_m: f64, limit: i64) -> Result<Vec<(DeviceEntity, f64)>, sqlx::Error> {
        // Plain-SQL haversine in the WHERE/ORDER BY clause, kept in lockstep
        // with `domain::spatial::haversine` — no PostGIS dependency.
        let rows: Vec<(DeviceEntity, f64)> = sqlx::query_as(
            r#"
            SELECT d.id, d.device_id, d.user_id, d.name, d.external_id, d.active,
                   d.last_latitude, d.last_longitude, d.last_seen, d.created_at, d.updated_at,
                   6371000 * 2 * ASIN(SQRT(
                       POWER(SIN(RADIANS($2 - d.last_latitude) / 2), 2) +
                       COS(RADIANS(d.last_latitude)) * COS(RADIANS($2)) *
                       POWER(SIN(RADIANS($3 - d.last_longitude) / 2), 2)
                   )) AS distance_m
            FROM devices d
            WHERE d.user_id = $1 AND d.last_latitude IS NOT NULL
            HAVING 6371000 * 2 * ASIN(SQRT(
                       POWER(SIN(RADIANS($2 - d.last_latitude) / 2), 2) +
                       COS(RADIANS(d.last_latitude)) * COS(RADIANS($2)) *
                       POWER(SIN(RADIANS($3 - d.last_longitude) / 2), 2)
                   )) <= $4
            ORDER BY distance_m ASC
            LIMIT $5
            "#,
        )
        .bind(user_id)
        .bind(lat)
        .bind(lon)
        .bind(radius_m)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
