//! Geofence Index cache-invalidation listener (§4.5).
//!
//! A geofence create/update/delete publishes the owning user's id onto
//! [`GEOFENCE_MUTATION_CHANNEL`] (see `routes::geofences`). This task
//! subscribes once at startup and invalidates that user's entry in the
//! shared [`GeofenceIndex`] on receipt, so the next `containing` lookup —
//! via `IngestionService::ensure_geofence_index_loaded` — rebuilds it from
//! the store instead of serving a stale in-memory copy. Running on every
//! replica, this is what keeps a multi-replica deployment's indexes
//! coherent with a mutation handled by a different replica.
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use cache::Cache;
use domain::models::GEOFENCE_MUTATION_CHANNEL;
use domain::services::GeofenceIndex;

/// Spawns the listener task; returns immediately, the task runs for the
/// life of the process.
pub fn spawn(cache: Arc<dyn Cache>, index: Arc<GeofenceIndex>) {
    tokio::spawn(async move {
        let mut rx = match cache.subscribe(GEOFENCE_MUTATION_CHANNEL).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, "failed to subscribe to geofence mutation channel, index invalidation disabled");
                return;
            }
        };

        while let Some(payload) = rx.recv().await {
            match payload.parse::<Uuid>() {
                Ok(user_id) => index.invalidate(user_id),
                Err(e) => warn!(error = %e, %payload, "discarding malformed geofence mutation message"),
            }
        }
    });
}
