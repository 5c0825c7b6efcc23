//! Geofence Index (C5): a per-user in-memory spatial index of active
//! geofences, kept coherent with the store via explicit rebuild/upsert.

use crate::models::Geofence;
use crate::spatial::{self, BoundingBox, Point};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

struct IndexedGeofence {
    geofence: Geofence,
    bbox: BoundingBox,
}

/// Spatial index, sharded by `user_id` under one reader-preferred lock per
/// user so concurrent users never contend on the same entry.
#[derive(Default)]
pub struct GeofenceIndex {
    by_user: RwLock<HashMap<Uuid, RwLock<HashMap<Uuid, IndexedGeofence>>>>,
}

impl GeofenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the full index for `user` (§4.5 `rebuild`).
    pub fn rebuild(&self, user_id: Uuid, geofences: Vec<Geofence>) {
        let mut entries = HashMap::with_capacity(geofences.len());
        for geofence in geofences {
            let bbox = geofence.shape.bbox();
            entries.insert(geofence.geofence_id, IndexedGeofence { geofence, bbox });
        }
        self.by_user.write().expect("index lock poisoned").insert(user_id, RwLock::new(entries));
    }

    /// Broadphase by bbox, then exact polygon containment via C1 (§4.5
    /// `containing`).
    pub fn containing(&self, user_id: Uuid, point: Point) -> Vec<Uuid> {
        let by_user = self.by_user.read().expect("index lock poisoned");
        let Some(entries) = by_user.get(&user_id) else {
            return Vec::new();
        };
        let entries = entries.read().expect("user index lock poisoned");
        entries
            .values()
            .filter(|indexed| indexed.geofence.active)
            .filter(|indexed| indexed.bbox.contains(point))
            .filter(|indexed| spatial::contains(&indexed.geofence.shape, point))
            .map(|indexed| indexed.geofence.geofence_id)
            .collect()
    }

    pub fn upsert(&self, user_id: Uuid, geofence: Geofence) {
        let bbox = geofence.shape.bbox();
        let mut by_user = self.by_user.write().expect("index lock poisoned");
        let entries = by_user.entry(user_id).or_insert_with(|| RwLock::new(HashMap::new()));
        entries
            .write()
            .expect("user index lock poisoned")
            .insert(geofence.geofence_id, IndexedGeofence { geofence, bbox });
    }

    pub fn remove(&self, user_id: Uuid, geofence_id: Uuid) {
        let by_user = self.by_user.read().expect("index lock poisoned");
        if let Some(entries) = by_user.get(&user_id) {
            entries.write().expect("user index lock poisoned").remove(&geofence_id);
        }
    }

    pub fn invalidate(&self, user_id: Uuid) {
        self.by_user.write().expect("index lock poisoned").remove(&user_id);
    }

    pub fn is_loaded(&self, user_id: Uuid) -> bool {
        self.by_user.read().expect("index lock poisoned").contains_key(&user_id)
    }
}
