//! In-memory `StoreAdapter` test double used by the ingestion scenario
//! tests. Mirrors the semantics `PostgresStore` implements against
//! Postgres, minus persistence across process restarts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{Device, DeviceStats, Geofence, NewTrajectoryPoint, Trajectory};
use domain::spatial::{haversine, Point, Polygon};
use domain::store::{IngestTransaction, StoreAdapter, StoreError, StoreResult};
use uuid::Uuid;

#[derive(Default)]
struct State {
    devices: HashMap<Uuid, Device>,
    geofences: HashMap<Uuid, Geofence>,
    trajectories: HashMap<Uuid, Trajectory>,
    next_id: i64,
}

/// Single-process `StoreAdapter` backed by a mutex-guarded map, with a
/// matching `IngestTransaction` that buffers writes and only applies them
/// to the shared state on `commit`.
#[derive(Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(state: &mut State) -> i64 {
        state.next_id += 1;
        state.next_id
    }

    pub fn seed_device(&self, user_id: Uuid, name: &str) -> Device {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state);
        let now = Utc::now();
        let device = Device {
            id,
            device_id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            external_id: None,
            active: true,
            last_point: None,
            last_seen: None,
            created_at: now,
            updated_at: now,
        };
        state.devices.insert(device.device_id, device.clone());
        device
    }

    pub fn seed_geofence(&self, user_id: Uuid, name: &str, shape: Polygon) -> Geofence {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state);
        let now = Utc::now();
        let geofence = Geofence {
            id,
            geofence_id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            shape,
            active: true,
            metadata: None,
            created_at: now,
            updated_at: now,
        };
        state.geofences.insert(geofence.geofence_id, geofence.clone());
        geofence
    }
}

#[async_trait]
impl StoreAdapter for InMemoryStore {
    async fn get_user_active_geofences(&self, user_id: Uuid) -> StoreResult<Vec<Geofence>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .geofences
            .values()
            .filter(|g| g.user_id == user_id && g.active)
            .cloned()
            .collect())
    }

    async fn geofences_containing(&self, user_id: Uuid, point: Point) -> StoreResult<Vec<Geofence>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .geofences
            .values()
            .filter(|g| g.user_id == user_id && g.active && g.contains_point(point))
            .cloned()
            .collect())
    }

    async fn nearby_devices(
        &self,
        user_id: Uuid,
        point: Point,
        radius_m: f64,
        limit: i64,
    ) -> StoreResult<Vec<(Device, f64)>> {
        let state = self.state.lock().unwrap();
        let mut found: Vec<(Device, f64)> = state
            .devices
            .values()
            .filter(|d| d.user_id == user_id)
            .filter_map(|d| d.last_point.map(|p| (d.clone(), haversine(point, p))))
            .filter(|(_, dist)| *dist <= radius_m)
            .collect();
        found.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn find_device(&self, user_id: Uuid, device_id: Uuid) -> StoreResult<Option<Device>> {
        let state = self.state.lock().unwrap();
        Ok(state.devices.get(&device_id).filter(|d| d.user_id == user_id).cloned())
    }

    async fn find_device_by_external_id(
        &self,
        user_id: Uuid,
        external_id: &str,
    ) -> StoreResult<Option<Device>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .devices
            .values()
            .find(|d| d.user_id == user_id && d.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn create_device(&self, user_id: Uuid, name: &str, external_id: Option<&str>) -> StoreResult<Device> {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state);
        let now = Utc::now();
        let device = Device {
            id,
            device_id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            external_id: external_id.map(String::from),
            active: true,
            last_point: None,
            last_seen: None,
            created_at: now,
            updated_at: now,
        };
        state.devices.insert(device.device_id, device.clone());
        Ok(device)
    }

    async fn count_devices(&self, user_id: Uuid) -> StoreResult<i64> {
        let state = self.state.lock().unwrap();
        Ok(state.devices.values().filter(|d| d.user_id == user_id).count() as i64)
    }

    async fn create_geofence(
        &self,
        user_id: Uuid,
        name: &str,
        shape: &Polygon,
        metadata: Option<serde_json::Value>,
    ) -> StoreResult<Geofence> {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state);
        let now = Utc::now();
        let geofence = Geofence {
            id,
            geofence_id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            shape: shape.clone(),
            active: true,
            metadata,
            created_at: now,
            updated_at: now,
        };
        state.geofences.insert(geofence.geofence_id, geofence.clone());
        Ok(geofence)
    }

    async fn find_geofence(&self, user_id: Uuid, geofence_id: Uuid) -> StoreResult<Option<Geofence>> {
        let state = self.state.lock().unwrap();
        Ok(state.geofences.get(&geofence_id).filter(|g| g.user_id == user_id).cloned())
    }

    async fn update_geofence(
        &self,
        user_id: Uuid,
        geofence_id: Uuid,
        name: Option<&str>,
        active: Option<bool>,
        metadata: Option<serde_json::Value>,
    ) -> StoreResult<Option<Geofence>> {
        let mut state = self.state.lock().unwrap();
        let Some(geofence) = state.geofences.get_mut(&geofence_id).filter(|g| g.user_id == user_id) else {
            return Ok(None);
        };
        if let Some(name) = name {
            geofence.name = name.to_string();
        }
        if let Some(active) = active {
            geofence.active = active;
        }
        if metadata.is_some() {
            geofence.metadata = metadata;
        }
        geofence.updated_at = Utc::now();
        Ok(Some(geofence.clone()))
    }

    async fn delete_geofence(&self, user_id: Uuid, geofence_id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().unwrap();
        let existed = state.geofences.get(&geofence_id).map(|g| g.user_id == user_id).unwrap_or(false);
        if existed {
            state.geofences.remove(&geofence_id);
        }
        Ok(existed)
    }

    async fn count_geofences(&self, user_id: Uuid) -> StoreResult<i64> {
        let state = self.state.lock().unwrap();
        Ok(state.geofences.values().filter(|g| g.user_id == user_id).count() as i64)
    }

    async fn geofences_near(&self, user_id: Uuid, point: Point, radius_m: f64, limit: i64) -> StoreResult<Vec<Geofence>> {
        let state = self.state.lock().unwrap();
        let mut found: Vec<(Geofence, f64)> = state
            .geofences
            .values()
            .filter(|g| g.user_id == user_id)
            .map(|g| {
                let centroid = centroid(&g.shape);
                (g.clone(), haversine(point, centroid))
            })
            .filter(|(_, dist)| *dist <= radius_m)
            .collect();
        found.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        found.truncate(limit.max(0) as usize);
        Ok(found.into_iter().map(|(g, _)| g).collect())
    }

    async fn trajectories_for_device(
        &self,
        device_id: Uuid,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StoreResult<Vec<Trajectory>> {
        let state = self.state.lock().unwrap();
        let mut found: Vec<Trajectory> = state
            .trajectories
            .values()
            .filter(|t| t.device_id == device_id)
            .filter(|t| start_time.map(|s| t.end_time >= s).unwrap_or(true))
            .filter(|t| end_time.map(|e| t.start_time <= e).unwrap_or(true))
            .cloned()
            .collect();
        found.sort_by_key(|t| t.start_time);
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn device_stats(&self, device_id: Uuid, since: DateTime<Utc>) -> StoreResult<DeviceStats> {
        let state = self.state.lock().unwrap();
        let relevant: Vec<&Trajectory> =
            state.trajectories.values().filter(|t| t.device_id == device_id && t.end_time >= since).collect();
        let trajectory_count = relevant.len() as i64;
        let total_distance_m = relevant.iter().map(|t| t.total_distance_m).sum();
        let total_point_count = relevant.iter().map(|t| t.point_count).sum();
        let avg_speed_ms = if relevant.is_empty() {
            0.0
        } else {
            relevant.iter().map(|t| t.avg_speed_ms).sum::<f64>() / relevant.len() as f64
        };
        let max_speed_ms = relevant.iter().map(|t| t.max_speed_ms).fold(0.0, f64::max);
        Ok(DeviceStats { trajectory_count, total_distance_m, total_point_count, avg_speed_ms, max_speed_ms })
    }

    async fn begin_ingest(&self) -> StoreResult<Box<dyn IngestTransaction>> {
        Ok(Box::new(InMemoryIngestTx {
            state: self.state.clone(),
            pending_device: None,
            pending_trajectory: None,
        }))
    }
}

fn centroid(shape: &Polygon) -> Point {
    let n = shape.vertices.len() as f64;
    let (lat, lon) = shape.vertices.iter().fold((0.0, 0.0), |(lat, lon), p| (lat + p.lat, lon + p.lon));
    Point::new(lat / n, lon / n).expect("centroid of a valid polygon is a valid point")
}

/// Buffers one device's location/trajectory/point writes, applied to the
/// shared state atomically on `commit`.
struct InMemoryIngestTx {
    state: Arc<Mutex<State>>,
    pending_device: Option<(Uuid, Point, DateTime<Utc>)>,
    pending_trajectory: Option<Trajectory>,
}

#[async_trait]
impl IngestTransaction for InMemoryIngestTx {
    async fn upsert_device_location(
        &mut self,
        device_id: Uuid,
        point: Point,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let state = self.state.lock().unwrap();
        let Some(device) = state.devices.get(&device_id) else {
            return Err(StoreError::Fatal("device not found".into()));
        };
        let applies = device.last_seen.map(|last_seen| seen_at > last_seen).unwrap_or(true);
        if !applies {
            return Ok(false);
        }
        drop(state);
        self.pending_device = Some((device_id, point, seen_at));
        Ok(true)
    }

    async fn open_or_extend_trajectory(
        &mut self,
        device_id: Uuid,
        now: DateTime<Utc>,
        gap_threshold: chrono::Duration,
    ) -> StoreResult<Trajectory> {
        let state = self.state.lock().unwrap();
        let open = state
            .trajectories
            .values()
            .filter(|t| t.device_id == device_id)
            .max_by_key(|t| t.end_time)
            .filter(|t| t.is_open_for(now, gap_threshold))
            .cloned();
        drop(state);
        let trajectory = open.unwrap_or_else(|| Trajectory::new(device_id, now));
        self.pending_trajectory = Some(trajectory.clone());
        Ok(trajectory)
    }

    async fn append_trajectory_point(
        &mut self,
        _trajectory_id: Uuid,
        _point: NewTrajectoryPoint,
    ) -> StoreResult<()> {
        Ok(())
    }

    async fn save_trajectory_aggregates(&mut self, trajectory: &Trajectory) -> StoreResult<()> {
        self.pending_trajectory = Some(trajectory.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some((device_id, point, seen_at)) = self.pending_device {
            if let Some(device) = state.devices.get_mut(&device_id) {
                device.last_point = Some(point);
                device.last_seen = Some(seen_at);
                device.updated_at = seen_at;
            }
        }
        if let Some(mut trajectory) = self.pending_trajectory {
            if trajectory.id == 0 {
                state.next_id += 1;
                trajectory.id = state.next_id;
            }
            state.trajectories.insert(trajectory.trajectory_id, trajectory);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
