//! End-to-end ingestion scenarios against an in-memory store (§8): enter,
//! exit, trajectory split, and out-of-order rejection.

mod common;

use std::sync::Arc;
use std::time::Duration;

use cache::InProcessCache;
use chrono::{TimeZone, Utc};
use common::InMemoryStore;
use domain::services::GeofenceIndex;
use domain::spatial::{Point, Polygon};
use domain::store::StoreAdapter;
use geotrack_api::services::{IngestionService, LocationSample, WebhookDispatcher};
use uuid::Uuid;

fn square_geofence_shape() -> Polygon {
    Polygon::new(vec![
        Point::new(52.5, 13.3).unwrap(),
        Point::new(52.55, 13.3).unwrap(),
        Point::new(52.55, 13.45).unwrap(),
        Point::new(52.5, 13.45).unwrap(),
    ])
    .unwrap()
}

fn build_service(store: Arc<InMemoryStore>) -> Arc<IngestionService> {
    let cache = Arc::new(InProcessCache::new());
    let index = Arc::new(GeofenceIndex::new());
    let webhooks = WebhookDispatcher::new(
        cache.clone(),
        Duration::from_secs(5),
        4,
        100,
        Duration::from_secs(3600),
        Duration::from_secs(3600),
    );
    Arc::new(IngestionService::new(
        store,
        cache,
        index,
        webhooks,
        3600, // gap_threshold_secs: 1 hour, matching scenario 3's split
        Duration::from_secs(60),
        Duration::from_secs(60),
    ))
}

fn sample(lat: f64, lon: f64, ts: chrono::DateTime<Utc>) -> LocationSample {
    LocationSample {
        point: Point::new(lat, lon).unwrap(),
        timestamp: ts,
        speed: None,
        heading: None,
        accuracy_m: None,
        altitude_m: None,
    }
}

#[tokio::test]
async fn enter_event_on_first_ingest() {
    let store = Arc::new(InMemoryStore::new());
    let user_id = Uuid::new_v4();
    let device = store.seed_device(user_id, "tracker");
    let geofence = store.seed_geofence(user_id, "home", square_geofence_shape());

    let service = build_service(store.clone());

    let ts = Utc.with_ymd_and_hms(2025, 7, 16, 12, 0, 0).unwrap();
    let result = service
        .ingest_location(user_id, device.device_id, sample(52.525, 13.375, ts))
        .await
        .unwrap();

    assert_eq!(result.current_members, vec![geofence.geofence_id]);

    let trajectories = store.trajectories_for_device(device.device_id, None, None, 10).await.unwrap();
    assert_eq!(trajectories.len(), 1);
    assert_eq!(trajectories[0].point_count, 1);
}

#[tokio::test]
async fn exit_event_after_leaving_geofence() {
    let store = Arc::new(InMemoryStore::new());
    let user_id = Uuid::new_v4();
    let device = store.seed_device(user_id, "tracker");
    store.seed_geofence(user_id, "home", square_geofence_shape());

    let service = build_service(store.clone());

    let t0 = Utc.with_ymd_and_hms(2025, 7, 16, 12, 0, 0).unwrap();
    service.ingest_location(user_id, device.device_id, sample(52.525, 13.375, t0)).await.unwrap();

    let t1 = Utc.with_ymd_and_hms(2025, 7, 16, 12, 5, 0).unwrap();
    let result = service.ingest_location(user_id, device.device_id, sample(52.600, 13.500, t1)).await.unwrap();

    assert!(result.current_members.is_empty());

    let trajectories = store.trajectories_for_device(device.device_id, None, None, 10).await.unwrap();
    assert_eq!(trajectories.len(), 1);
    assert_eq!(trajectories[0].point_count, 2);
    let rel_err = (trajectories[0].total_distance_m - 12_340.0).abs() / 12_340.0;
    assert!(rel_err < 0.02, "got {}", trajectories[0].total_distance_m);
}

#[tokio::test]
async fn trajectory_splits_after_gap_threshold() {
    let store = Arc::new(InMemoryStore::new());
    let user_id = Uuid::new_v4();
    let device = store.seed_device(user_id, "tracker");
    store.seed_geofence(user_id, "home", square_geofence_shape());

    let service = build_service(store.clone());

    let t0 = Utc.with_ymd_and_hms(2025, 7, 16, 12, 0, 0).unwrap();
    service.ingest_location(user_id, device.device_id, sample(52.525, 13.375, t0)).await.unwrap();

    let t1 = Utc.with_ymd_and_hms(2025, 7, 16, 12, 5, 0).unwrap();
    service.ingest_location(user_id, device.device_id, sample(52.600, 13.500, t1)).await.unwrap();

    // gap > 1h triggers a new trajectory.
    let t2 = Utc.with_ymd_and_hms(2025, 7, 16, 13, 10, 0).unwrap();
    service.ingest_location(user_id, device.device_id, sample(52.600, 13.500, t2)).await.unwrap();

    let mut trajectories = store.trajectories_for_device(device.device_id, None, None, 10).await.unwrap();
    assert_eq!(trajectories.len(), 2);
    trajectories.sort_by_key(|t| t.start_time);
    assert_eq!(trajectories[0].end_time, t1);
    assert_eq!(trajectories[1].start_time, t2);
}

#[tokio::test]
async fn out_of_order_update_is_rejected_without_state_change() {
    let store = Arc::new(InMemoryStore::new());
    let user_id = Uuid::new_v4();
    let device = store.seed_device(user_id, "tracker");

    let service = build_service(store.clone());

    let t0 = Utc.with_ymd_and_hms(2025, 7, 16, 12, 5, 0).unwrap();
    service.ingest_location(user_id, device.device_id, sample(52.525, 13.375, t0)).await.unwrap();

    let earlier = Utc.with_ymd_and_hms(2025, 7, 16, 12, 4, 0).unwrap();
    let err = service.ingest_location(user_id, device.device_id, sample(52.6, 13.5, earlier)).await.unwrap_err();
    assert!(matches!(err, geotrack_api::error::ApiError::OutOfOrder(_)));

    let current = store.find_device(user_id, device.device_id).await.unwrap().unwrap();
    assert_eq!(current.last_seen, Some(t0), "rejected update must not move last_seen");
}

#[tokio::test]
async fn replay_of_same_observation_is_idempotent() {
    let store = Arc::new(InMemoryStore::new());
    let user_id = Uuid::new_v4();
    let device = store.seed_device(user_id, "tracker");
    let geofence = store.seed_geofence(user_id, "home", square_geofence_shape());

    let service = build_service(store.clone());

    let ts = Utc.with_ymd_and_hms(2025, 7, 16, 12, 0, 0).unwrap();
    service.ingest_location(user_id, device.device_id, sample(52.525, 13.375, ts)).await.unwrap();

    let replayed = service.ingest_location(user_id, device.device_id, sample(52.525, 13.375, ts)).await.unwrap();
    assert_eq!(replayed.current_members, vec![geofence.geofence_id]);

    let trajectories = store.trajectories_for_device(device.device_id, None, None, 10).await.unwrap();
    assert_eq!(trajectories[0].point_count, 1, "replay must not append a second trajectory point");
}

#[tokio::test]
async fn bulk_ingest_is_equivalent_to_sequential_single_updates() {
    let bulk_store = Arc::new(InMemoryStore::new());
    let user_id = Uuid::new_v4();
    let bulk_device = bulk_store.seed_device(user_id, "bulk");
    let bulk_service = build_service(bulk_store.clone());

    let sequential_store = Arc::new(InMemoryStore::new());
    let sequential_device = sequential_store.seed_device(user_id, "sequential");
    let sequential_service = build_service(sequential_store.clone());

    let timestamps: Vec<_> = (0..5)
        .map(|i| Utc.with_ymd_and_hms(2025, 7, 16, 12, i, 0).unwrap())
        .collect();
    let points = [
        (52.50, 13.30),
        (52.51, 13.32),
        (52.52, 13.34),
        (52.53, 13.36),
        (52.54, 13.38),
    ];

    let items: Vec<domain::models::BulkLocationItem> = points
        .iter()
        .zip(&timestamps)
        .map(|(&(lat, lon), &ts)| domain::models::BulkLocationItem {
            device_id: bulk_device.device_id,
            latitude: lat,
            longitude: lon,
            timestamp: Some(ts),
            speed: None,
            heading: None,
            accuracy: None,
            altitude: None,
        })
        .collect();

    let bulk_response = bulk_service.ingest_bulk(user_id, items).await;
    assert!(bulk_response.failed.is_empty());
    assert_eq!(bulk_response.total, 5);

    for (&(lat, lon), &ts) in points.iter().zip(&timestamps) {
        sequential_service
            .ingest_location(user_id, sequential_device.device_id, sample(lat, lon, ts))
            .await
            .unwrap();
    }

    let bulk_trajectories = bulk_store.trajectories_for_device(bulk_device.device_id, None, None, 10).await.unwrap();
    let sequential_trajectories =
        sequential_store.trajectories_for_device(sequential_device.device_id, None, None, 10).await.unwrap();

    assert_eq!(bulk_trajectories.len(), sequential_trajectories.len());
    assert_eq!(bulk_trajectories[0].point_count, sequential_trajectories[0].point_count);
    assert!(
        (bulk_trajectories[0].total_distance_m - sequential_trajectories[0].total_distance_m).abs() < 1e-6
    );
}
