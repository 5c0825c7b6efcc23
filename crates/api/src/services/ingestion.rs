//! Ingestion Pipeline (C8, §4.8) and Bulk Location Orchestrator (C11, §4.11).
//!
//! One call to [`IngestionService::ingest_location`] is the per-device
//! critical section described in §5: validate ordering against
//! `device.last_seen`, write device/trajectory/point state inside a single
//! store transaction, then — outside the transaction — refresh the
//! geofence-membership cache mirror, diff transitions via the Device State
//! Tracker (C6), and fan them onto the Event Bus (C9) and Webhook
//! Dispatcher (C10).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use tracing::warn;
use uuid::Uuid;

use cache::{self, Cache};
use domain::models::{
    device_channel, geofence_channel, BulkLocationFailure, BulkLocationItem, BulkLocationResponse,
    LocationUpdateResult, NewTrajectoryPoint, TransitionEvent, CHANNEL_GLOBAL,
};
use domain::services::{device_tracker, trajectory_segmenter, DeviceMembership, GeofenceIndex};
use domain::spatial::Point;
use domain::store::StoreAdapter;

use crate::error::ApiError;
use crate::services::webhook_delivery::WebhookDispatcher;

fn location_cache_key(device_id: Uuid) -> String {
    format!("device:{device_id}:location")
}

fn state_cache_key(device_id: Uuid) -> String {
    format!("device_state:{device_id}")
}

/// Returns the index of the first item whose timestamp precedes the prior
/// item with an explicit timestamp, or `None` if the submitted order is
/// already non-decreasing. Items without a timestamp are skipped, mirroring
/// `validate_locations_order`'s filter of `loc.timestamp` truthy entries.
fn first_out_of_order_index(group: &[BulkLocationItem]) -> Option<usize> {
    let mut last: Option<DateTime<Utc>> = None;
    for (i, item) in group.iter().enumerate() {
        let Some(ts) = item.timestamp else { continue };
        if let Some(prev) = last {
            if ts < prev {
                return Some(i);
            }
        }
        last = Some(ts);
    }
    None
}

pub struct IngestionService {
    store: Arc<dyn StoreAdapter>,
    cache: Arc<dyn Cache>,
    geofence_index: Arc<GeofenceIndex>,
    webhooks: Arc<WebhookDispatcher>,
    gap_threshold: Duration,
    device_location_ttl: StdDuration,
    device_state_ttl: StdDuration,
}

/// One telemetry sample to apply for a device, already range-validated by
/// the request DTO.
pub struct LocationSample {
    pub point: Point,
    pub timestamp: DateTime<Utc>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub altitude_m: Option<f64>,
}

impl IngestionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn StoreAdapter>,
        cache: Arc<dyn Cache>,
        geofence_index: Arc<GeofenceIndex>,
        webhooks: Arc<WebhookDispatcher>,
        gap_threshold_secs: i64,
        device_location_ttl: StdDuration,
        device_state_ttl: StdDuration,
    ) -> Self {
        Self {
            store,
            cache,
            geofence_index,
            webhooks,
            gap_threshold: Duration::seconds(gap_threshold_secs),
            device_location_ttl,
            device_state_ttl,
        }
    }

    /// Applies one telemetry sample for `device_id` (§4.8 steps 1-8).
    pub async fn ingest_location(
        &self,
        user_id: Uuid,
        device_id: Uuid,
        sample: LocationSample,
    ) -> Result<LocationUpdateResult, ApiError> {
        let start = std::time::Instant::now();

        let device = self
            .store
            .find_device(user_id, device_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("device not found".into()))?;

        self.ensure_geofence_index_loaded(user_id).await?;

        if !device.accepts_timestamp(sample.timestamp) {
            counter!("ingest_updates_total", "outcome" => "out_of_order").increment(1);
            return Err(ApiError::OutOfOrder(
                "timestamp precedes the device's last known location".into(),
            ));
        }

        if device.is_replay(sample.timestamp) {
            // Idempotent: the store already reflects this observation, so we
            // skip the write and just report current membership (§4.8 step 4).
            let members = self.geofence_index.containing(user_id, sample.point);
            counter!("ingest_updates_total", "outcome" => "replay").increment(1);
            return Ok(LocationUpdateResult {
                device_id,
                current_members: members,
                trajectory_id: Uuid::nil(),
            });
        }

        let prev_point = device.last_point;
        let heading = sample.heading.map(domain::models::clamp_heading);

        let mut tx = self.store.begin_ingest().await?;

        let applied = tx
            .upsert_device_location(device_id, sample.point, sample.timestamp)
            .await?;
        if !applied {
            tx.rollback().await?;
            counter!("ingest_updates_total", "outcome" => "out_of_order").increment(1);
            return Err(ApiError::OutOfOrder(
                "concurrent update already advanced this device's location".into(),
            ));
        }

        let mut trajectory = tx
            .open_or_extend_trajectory(device_id, sample.timestamp, self.gap_threshold)
            .await?;
        trajectory_segmenter::append(&mut trajectory, prev_point, sample.point, sample.timestamp, sample.speed);

        tx.append_trajectory_point(
            trajectory.trajectory_id,
            NewTrajectoryPoint {
                location: sample.point,
                timestamp: sample.timestamp,
                speed: sample.speed,
                heading,
                accuracy_m: sample.accuracy_m,
                altitude_m: sample.altitude_m,
            },
        )
        .await?;
        tx.save_trajectory_aggregates(&trajectory).await?;
        tx.commit().await?;

        if let Err(e) = cache::set_json_with_ttl(
            self.cache.as_ref(),
            &location_cache_key(device_id),
            &sample.point,
            self.device_location_ttl,
        )
        .await
        {
            warn!(error = %e, "failed to refresh device location cache mirror");
        }

        let current_members = self
            .apply_membership_transitions(user_id, device_id, sample.point, sample.timestamp)
            .await;

        counter!("ingest_updates_total", "outcome" => "applied").increment(1);
        histogram!("ingest_latency_ms").record(start.elapsed().as_millis() as f64);

        Ok(LocationUpdateResult {
            device_id,
            current_members,
            trajectory_id: trajectory.trajectory_id,
        })
    }

    /// Warms the Geofence Index (C5) for `user_id` on first use so
    /// `containing` doesn't silently answer against an empty set for a user
    /// whose geofences haven't been loaded into this process yet (§4.5).
    async fn ensure_geofence_index_loaded(&self, user_id: Uuid) -> Result<(), ApiError> {
        if self.geofence_index.is_loaded(user_id) {
            return Ok(());
        }
        let geofences = self.store.get_user_active_geofences(user_id).await?;
        self.geofence_index.rebuild(user_id, geofences);
        Ok(())
    }

    /// Diffs geofence membership against the cached previous snapshot,
    /// persists the new snapshot, and fans out transitions to the Event Bus
    /// (C9) and Webhook Dispatcher (C10). Returns the new membership set.
    async fn apply_membership_transitions(
        &self,
        user_id: Uuid,
        device_id: Uuid,
        point: Point,
        ts: DateTime<Utc>,
    ) -> Vec<Uuid> {
        let new_members: Vec<Uuid> = self.geofence_index.containing(user_id, point);
        let new_members_set: HashSet<Uuid> = new_members.iter().copied().collect();

        let state_key = state_cache_key(device_id);
        let previous = cache::get_json::<DeviceMembership>(self.cache.as_ref(), &state_key)
            .await
            .ok()
            .flatten()
            .unwrap_or_default();

        let (transitions, updated) = device_tracker::transition(&previous, new_members_set, point, ts);

        if let Err(e) =
            cache::set_json_with_ttl(self.cache.as_ref(), &state_key, &updated, self.device_state_ttl).await
        {
            warn!(error = %e, "failed to persist device membership snapshot");
        }

        for t in &transitions {
            counter!("geofence_transitions_total", "event_type" => t.event_type.as_str()).increment(1);

            let event = TransitionEvent {
                event_type: t.event_type,
                device_id,
                geofence_id: t.geofence_id,
                user_id,
                point,
                ts,
                metadata: None,
            };
            self.publish_event(&event).await;
            self.webhooks.dispatch_if_subscribed(event).await;
        }

        new_members
    }

    async fn publish_event(&self, event: &TransitionEvent) {
        let Ok(payload) = serde_json::to_string(event) else {
            return;
        };
        let _ = self.cache.publish(CHANNEL_GLOBAL, &payload).await;
        let _ = self.cache.publish(&device_channel(event.device_id), &payload).await;
        let _ = self.cache.publish(&geofence_channel(event.geofence_id), &payload).await;
    }

    /// Dispatches bulk items per device in chronological order (§4.11):
    /// items are grouped by `device_id` in submission order and each
    /// group's timestamps are required to already be non-decreasing —
    /// matching `original_source/app/schemas/device.py`'s
    /// `validate_locations_order`, which rejects an out-of-order batch
    /// rather than reordering it. Groups that pass validation are
    /// processed concurrently, each strictly in sequence, so a later point
    /// never gets ingested before an earlier one for the same device.
    pub async fn ingest_bulk(self: &Arc<Self>, user_id: Uuid, items: Vec<BulkLocationItem>) -> BulkLocationResponse {
        let mut by_device: HashMap<Uuid, Vec<BulkLocationItem>> = HashMap::new();
        for item in items {
            by_device.entry(item.device_id).or_default().push(item);
        }

        let groups: Vec<(Uuid, Vec<BulkLocationItem>)> = by_device.into_iter().collect();

        let mut join_set = tokio::task::JoinSet::new();
        let mut total = 0usize;
        let mut successful = Vec::new();
        let mut failed = Vec::new();

        for (device_id, group) in groups {
            if let Some(bad_index) = first_out_of_order_index(&group) {
                warn!(
                    %device_id,
                    index = bad_index,
                    "bulk batch rejected: locations not in chronological order"
                );
                total += group.len();
                failed.extend(group.into_iter().map(|_| BulkLocationFailure {
                    device_id,
                    error: "locations must be in chronological order".to_string(),
                }));
                continue;
            }

            let this = Arc::clone(self);
            join_set.spawn(async move { this.ingest_device_group(user_id, device_id, group).await });
        }

        while let Some(outcome) = join_set.join_next().await {
            let Ok((count, device_successes, device_failures)) = outcome else {
                continue;
            };
            total += count;
            successful.extend(device_successes);
            failed.extend(device_failures);
        }

        BulkLocationResponse { successful, failed, total }
    }

    /// Applies one device's already-validated, chronologically ordered
    /// items strictly in sequence (§4.11), so a later point never lands
    /// before an earlier one.
    async fn ingest_device_group(
        &self,
        user_id: Uuid,
        device_id: Uuid,
        group: Vec<BulkLocationItem>,
    ) -> (usize, Vec<Uuid>, Vec<BulkLocationFailure>) {
        let mut device_successes = Vec::new();
        let mut device_failures = Vec::new();
        let count = group.len();

        for item in group {
            let point = match Point::new(item.latitude, item.longitude) {
                Ok(p) => p,
                Err(e) => {
                    device_failures.push(BulkLocationFailure {
                        device_id,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let sample = LocationSample {
                point,
                timestamp: item.timestamp.unwrap_or_else(Utc::now),
                speed: item.speed,
                heading: item.heading,
                accuracy_m: item.accuracy,
                altitude_m: item.altitude,
            };

            match self.ingest_location(user_id, device_id, sample).await {
                Ok(_) => device_successes.push(device_id),
                Err(e) => device_failures.push(BulkLocationFailure {
                    device_id,
                    error: e.to_string(),
                }),
            }
        }

        (count, device_successes, device_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn location_cache_key_format() {
        let id = Uuid::new_v4();
        assert_eq!(location_cache_key(id), format!("device:{id}:location"));
    }

    #[test]
    fn state_cache_key_format() {
        let id = Uuid::new_v4();
        assert_eq!(state_cache_key(id), format!("device_state:{id}"));
    }

    fn item_at(device_id: Uuid, minute: u32) -> BulkLocationItem {
        BulkLocationItem {
            device_id,
            latitude: 0.0,
            longitude: 0.0,
            timestamp: Some(chrono::Utc.with_ymd_and_hms(2025, 1, 1, 0, minute, 0).unwrap()),
            speed: None,
            heading: None,
            accuracy: None,
            altitude: None,
        }
    }

    #[test]
    fn first_out_of_order_index_accepts_non_decreasing_batch() {
        let id = Uuid::new_v4();
        let group = vec![item_at(id, 0), item_at(id, 1), item_at(id, 1), item_at(id, 2)];
        assert_eq!(first_out_of_order_index(&group), None);
    }

    #[test]
    fn first_out_of_order_index_flags_the_first_regression() {
        let id = Uuid::new_v4();
        let group = vec![item_at(id, 5), item_at(id, 2), item_at(id, 10)];
        assert_eq!(first_out_of_order_index(&group), Some(1));
    }

    #[test]
    fn first_out_of_order_index_skips_items_without_a_timestamp() {
        let id = Uuid::new_v4();
        let mut untimestamped = item_at(id, 0);
        untimestamped.timestamp = None;
        let group = vec![item_at(id, 5), untimestamped, item_at(id, 10)];
        assert_eq!(first_out_of_order_index(&group), None);
    }
}
