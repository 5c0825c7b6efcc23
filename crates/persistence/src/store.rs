//! Postgres implementation of the Store Adapter contract (C2).
//!
//! No domain logic lives here beyond translating `StoreAdapter`/
//! `IngestTransaction` calls into the repositories in this crate; the
//! membership diff, trajectory segmentation, and rate limiting stay in
//! `domain::services`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{Device, DeviceStats, Geofence, NewTrajectoryPoint, Trajectory};
use domain::spatial::{contains, haversine, Point, Polygon};
use domain::store::{IngestTransaction, StoreAdapter, StoreError, StoreResult};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::entities::{GeofenceEntity, TrajectoryEntity, TrajectoryPointEntity};
use crate::repositories::{DeviceRepository, GeofenceRepository, TrajectoryRepository};

fn map_sqlx_err(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() || db_err.is_foreign_key_violation() => {
            StoreError::Conflict(db_err.to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => StoreError::Transient(err.to_string()),
        _ => StoreError::Fatal(err.to_string()),
    }
}

fn decode_geofence(entity: GeofenceEntity) -> StoreResult<Geofence> {
    Geofence::try_from(entity).map_err(|e| StoreError::Fatal(e.to_string()))
}

pub struct PostgresStore {
    pool: PgPool,
    devices: DeviceRepository,
    geofences: GeofenceRepository,
    trajectories: TrajectoryRepository,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            devices: DeviceRepository::new(pool.clone()),
            geofences: GeofenceRepository::new(pool.clone()),
            trajectories: TrajectoryRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl StoreAdapter for PostgresStore {
    async fn get_user_active_geofences(&self, user_id: Uuid) -> StoreResult<Vec<Geofence>> {
        let rows = self.geofences.find_active_by_user(user_id).await.map_err(map_sqlx_err)?;
        rows.into_iter().map(decode_geofence).collect()
    }

    async fn geofences_containing(&self, user_id: Uuid, point: Point) -> StoreResult<Vec<Geofence>> {
        let rows = self.geofences.find_active_by_user(user_id).await.map_err(map_sqlx_err)?;
        let mut out = Vec::new();
        for entity in rows {
            let geofence = decode_geofence(entity)?;
            if contains(&geofence.shape, point) {
                out.push(geofence);
            }
        }
        Ok(out)
    }

    async fn nearby_devices(&self, user_id: Uuid, point: Point, radius_m: f64, limit: i64) -> StoreResult<Vec<(Device, f64)>> {
        let rows = self.devices.nearby(user_id, point.lat, point.lon, radius_m, limit).await.map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(|(e, d)| (e.into(), d)).collect())
    }

    async fn find_device(&self, user_id: Uuid, device_id: Uuid) -> StoreResult<Option<Device>> {
        let row = self.devices.find_by_device_id(user_id, device_id).await.map_err(map_sqlx_err)?;
        Ok(row.map(Into::into))
    }

    async fn find_device_by_external_id(&self, user_id: Uuid, external_id: &str) -> StoreResult<Option<Device>> {
        let row = self.devices.find_by_external_id(user_id, external_id).await.map_err(map_sqlx_err)?;
        Ok(row.map(Into::into))
    }

    async fn create_device(&self, user_id: Uuid, name: &str, external_id: Option<&str>) -> StoreResult<Device> {
        let row = self.devices.create(user_id, name, external_id).await.map_err(map_sqlx_err)?;
        Ok(row.into())
    }

    async fn count_devices(&self, user_id: Uuid) -> StoreResult<i64> {
        self.devices.count_for_user(user_id).await.map_err(map_sqlx_err)
    }

    async fn create_geofence(&self, user_id: Uuid, name: &str, shape: &Polygon, metadata: Option<serde_json::Value>) -> StoreResult<Geofence> {
        let vertices = GeofenceEntity::encode_vertices(shape);
        let row = self.geofences.create(user_id, name, vertices, metadata).await.map_err(map_sqlx_err)?;
        decode_geofence(row)
    }

    async fn find_geofence(&self, user_id: Uuid, geofence_id: Uuid) -> StoreResult<Option<Geofence>> {
        let row = self.geofences.find_by_geofence_id(user_id, geofence_id).await.map_err(map_sqlx_err)?;
        row.map(decode_geofence).transpose()
    }

    async fn update_geofence(
        &self,
        user_id: Uuid,
        geofence_id: Uuid,
        name: Option<&str>,
        active: Option<bool>,
        metadata: Option<serde_json::Value>,
    ) -> StoreResult<Option<Geofence>> {
        let row = self
            .geofences
            .update(user_id, geofence_id, name, active, metadata)
            .await
            .map_err(map_sqlx_err)?;
        row.map(decode_geofence).transpose()
    }

    async fn delete_geofence(&self, user_id: Uuid, geofence_id: Uuid) -> StoreResult<bool> {
        self.geofences.delete(user_id, geofence_id).await.map_err(map_sqlx_err)
    }

    async fn count_geofences(&self, user_id: Uuid) -> StoreResult<i64> {
        self.geofences.count_for_user(user_id).await.map_err(map_sqlx_err)
    }

    async fn geofences_near(&self, user_id: Uuid, point: Point, radius_m: f64, limit: i64) -> StoreResult<Vec<Geofence>> {
        let rows = self.geofences.near(user_id, limit * 4).await.map_err(map_sqlx_err)?;
        let mut out = Vec::new();
        for entity in rows {
            let geofence = decode_geofence(entity)?;
            let nearest = geofence
                .shape
                .vertices
                .iter()
                .map(|&v| haversine(point, v))
                .fold(f64::MAX, f64::min);
            if nearest <= radius_m || contains(&geofence.shape, point) {
                out.push(geofence);
            }
            if out.len() as i64 >= limit {
                break;
            }
        }
        Ok(out)
    }

    async fn trajectories_for_device(
        &self,
        device_id: Uuid,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StoreResult<Vec<Trajectory>> {
        let rows = self
            .trajectories
            .find_for_device(device_id, start_time, end_time, limit)
            .await
            .map_err(map_sqlx_err)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn device_stats(&self, device_id: Uuid, since: DateTime<Utc>) -> StoreResult<DeviceStats> {
        let (trajectory_count, total_distance_m, max_speed_ms) =
            self.trajectories.stats_since(device_id, since).await.map_err(map_sqlx_err)?;
        let points: (Option<i64>,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(point_count), 0)
            FROM trajectories
            WHERE device_id = $1 AND start_time >= $2
            "#,
        )
        .bind(device_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        let total_point_count = points.0.unwrap_or(0);
        let duration_s = (Utc::now() - since).num_milliseconds() as f64 / 1000.0;
        let avg_speed_ms = if duration_s > 0.0 { total_distance_m / duration_s } else { 0.0 };
        Ok(DeviceStats { trajectory_count, total_distance_m, total_point_count, avg_speed_ms, max_speed_ms })
    }

    async fn begin_ingest(&self) -> StoreResult<Box<dyn IngestTransaction>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        Ok(Box::new(PostgresIngestTx { tx }))
    }
}

pub struct PostgresIngestTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl IngestTransaction for PostgresIngestTx {
    async fn upsert_device_location(&mut self, device_id: Uuid, point: Point, seen_at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET last_latitude = $2, last_longitude = $3, last_seen = $4, updated_at = $4
            WHERE device_id = $1 AND (last_seen IS NULL OR $4 > last_seen)
            "#,
        )
        .bind(device_id)
        .bind(point.lat)
        .bind(point.lon)
        .bind(seen_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn open_or_extend_trajectory(
        &mut self,
        device_id: Uuid,
        now: DateTime<Utc>,
        gap_threshold: chrono::Duration,
    ) -> StoreResult<Trajectory> {
        let existing = sqlx::query_as::<_, TrajectoryEntity>(
            r#"
            SELECT id, trajectory_id, device_id, start_time, end_time, point_count,
                   total_distance_m, avg_speed_ms, max_speed_ms, created_at, updated_at
            FROM trajectories
            WHERE device_id = $1
            ORDER BY start_time DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(device_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;

        if let Some(entity) = existing {
            let trajectory: Trajectory = entity.into();
            if trajectory.is_open_for(now, gap_threshold) {
                return Ok(trajectory);
            }
        }

        let fresh = Trajectory::new(device_id, now);
        let inserted = sqlx::query_as::<_, TrajectoryEntity>(
            r#"
            INSERT INTO trajectories (trajectory_id, device_id, start_time, end_time, point_count,
                                       total_distance_m, avg_speed_ms, max_speed_ms, created_at, updated_at)
            VALUES ($1, $2, $3, $3, 0, 0.0, 0.0, 0.0, $3, $3)
            RETURNING id, trajectory_id, device_id, start_time, end_time, point_count,
                      total_distance_m, avg_speed_ms, max_speed_ms, created_at, updated_at
            "#,
        )
        .bind(fresh.trajectory_id)
        .bind(device_id)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;
        Ok(inserted.into())
    }

    async fn append_trajectory_point(&mut self, trajectory_id: Uuid, point: NewTrajectoryPoint) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO trajectory_points (trajectory_id, latitude, longitude, timestamp, speed, heading, accuracy_m, altitude_m)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(trajectory_id)
        .bind(point.location.lat)
        .bind(point.location.lon)
        .bind(point.timestamp)
        .bind(point.speed)
        .bind(point.heading)
        .bind(point.accuracy_m)
        .bind(point.altitude_m)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn save_trajectory_aggregates(&mut self, trajectory: &Trajectory) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE trajectories SET
                end_time = $2,
                point_count = $3,
                total_distance_m = $4,
                avg_speed_ms = $5,
                max_speed_ms = $6,
                updated_at = $2
            WHERE trajectory_id = $1
            "#,
        )
        .bind(trajectory.trajectory_id)
        .bind(trajectory.end_time)
        .bind(trajectory.point_count)
        .bind(trajectory.total_distance_m)
        .bind(trajectory.avg_speed_ms)
        .bind(trajectory.max_speed_ms)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(map_sqlx_err)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await.map_err(map_sqlx_err)
    }
}

/// Fetches the most recent point in a trajectory, used by the ingestion
/// pipeline (C8) to compute the haversine delta for the aggregate update
/// before calling `append_trajectory_point`.
pub async fn last_point_in_trajectory(pool: &PgPool, trajectory_id: Uuid) -> StoreResult<Option<Point>> {
    let row = sqlx::query_as::<_, TrajectoryPointEntity>(
        r#"
        SELECT id, trajectory_id, latitude, longitude, timestamp, speed, heading, accuracy_m, altitude_m
        FROM trajectory_points
        WHERE trajectory_id = $1
        ORDER BY timestamp DESC
        LIMIT 1
        "#,
    )
    .bind(trajectory_id)
    .fetch_optional(pool)
    .await
    .map_err(map_sqlx_err)?;
    Ok(row.map(|e| Point { lat: e.latitude, lon: e.longitude }))
}
