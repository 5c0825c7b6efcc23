//! Core service layer: ingestion pipeline, webhook dispatch, and the
//! geofence index's cache-driven invalidation listener.

pub mod geofence_index_sync;
pub mod ingestion;
pub mod webhook_delivery;

pub use ingestion::{IngestionService, LocationSample};
pub use webhook_delivery::WebhookDispatcher;
