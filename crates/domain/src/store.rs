//! Store Adapter contract (C2). No SQL here — this is the trait the
//! `persistence` crate implements against Postgres, so that the domain and
//! API crates depend only on this contract (§9 "ORM-style object-graph in
//! the source → replaced by the explicit Store Adapter contract").

use crate::models::{Device, Geofence, NewTrajectoryPoint, Trajectory};
use crate::spatial::Point;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Store failure classification (§4.2, §7): transient errors are safe to
/// retry, conflicts are uniqueness/FK violations, fatal errors are not
/// retriable.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("store conflict: {0}")]
    Conflict(String),
    #[error("fatal store error: {0}")]
    Fatal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read/write operations against the relational store that don't need to
/// participate in the per-device ingest transaction.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    async fn get_user_active_geofences(&self, user_id: Uuid) -> StoreResult<Vec<Geofence>>;

    /// Spatial predicate delegated to the store when possible; C5 also
    /// keeps a C1-based in-memory fallback that must return identical
    /// results.
    async fn geofences_containing(&self, user_id: Uuid, point: Point) -> StoreResult<Vec<Geofence>>;

    /// Distance from `point` to each of `others`, in the same order (§4.2).
    /// The default C1 fallback is `haversine`; a PostGIS-backed store may
    /// answer this with a single spatial query instead.
    async fn bulk_distance_point_to_many(&self, point: Point, others: &[Point]) -> StoreResult<Vec<f64>> {
        Ok(others.iter().map(|&o| crate::spatial::haversine(point, o)).collect())
    }

    async fn nearby_devices(
        &self,
        user_id: Uuid,
        point: Point,
        radius_m: f64,
        limit: i64,
    ) -> StoreResult<Vec<(Device, f64)>>;

    async fn find_device(&self, user_id: Uuid, device_id: Uuid) -> StoreResult<Option<Device>>;
    async fn find_device_by_external_id(
        &self,
        user_id: Uuid,
        external_id: &str,
    ) -> StoreResult<Option<Device>>;
    async fn create_device(&self, user_id: Uuid, name: &str, external_id: Option<&str>) -> StoreResult<Device>;
    async fn count_devices(&self, user_id: Uuid) -> StoreResult<i64>;

    async fn create_geofence(
        &self,
        user_id: Uuid,
        name: &str,
        shape: &crate::spatial::Polygon,
        metadata: Option<serde_json::Value>,
    ) -> StoreResult<Geofence>;
    async fn find_geofence(&self, user_id: Uuid, geofence_id: Uuid) -> StoreResult<Option<Geofence>>;
    async fn update_geofence(
        &self,
        user_id: Uuid,
        geofence_id: Uuid,
        name: Option<&str>,
        active: Option<bool>,
        metadata: Option<serde_json::Value>,
    ) -> StoreResult<Option<Geofence>>;
    async fn delete_geofence(&self, user_id: Uuid, geofence_id: Uuid) -> StoreResult<bool>;
    async fn count_geofences(&self, user_id: Uuid) -> StoreResult<i64>;
    async fn geofences_near(&self, user_id: Uuid, point: Point, radius_m: f64, limit: i64) -> StoreResult<Vec<Geofence>>;

    async fn trajectories_for_device(
        &self,
        device_id: Uuid,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StoreResult<Vec<Trajectory>>;
    async fn device_stats(&self, device_id: Uuid, since: DateTime<Utc>) -> StoreResult<crate::models::DeviceStats>;

    /// Opens a logical transaction spanning device + trajectory + point
    /// writes for one ingestion step (§4.2 commit/rollback, §4.8 step 6).
    async fn begin_ingest(&self) -> StoreResult<Box<dyn IngestTransaction>>;
}

/// The write surface used inside a single device's critical section. Every
/// method operates within one logical transaction; callers must call
/// exactly one of `commit`/`rollback`.
#[async_trait]
pub trait IngestTransaction: Send {
    /// Conditional update: applies only if `seen_at > device.last_seen OR
    /// device.last_seen IS NULL`. Returns whether the write applied.
    async fn upsert_device_location(
        &mut self,
        device_id: Uuid,
        point: Point,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn open_or_extend_trajectory(
        &mut self,
        device_id: Uuid,
        now: DateTime<Utc>,
        gap_threshold: chrono::Duration,
    ) -> StoreResult<Trajectory>;

    async fn append_trajectory_point(
        &mut self,
        trajectory_id: Uuid,
        point: NewTrajectoryPoint,
    ) -> StoreResult<()>;

    async fn save_trajectory_aggregates(&mut self, trajectory: &Trajectory) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
