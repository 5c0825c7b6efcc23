//! Domain layer for the geofence telemetry backend.
//!
//! This crate contains:
//! - Spatial primitives (C1): point/polygon geometry, haversine, circle
//!   approximation, offset, polyline buffer
//! - Domain models: Device, Geofence, Trajectory, TrajectoryPoint, User,
//!   WebhookSubscription, TransitionEvent
//! - The Store Adapter contract (C2) the persistence crate implements
//! - Domain services: Admission Controller (C4), Geofence Index (C5),
//!   Device State Tracker (C6), Trajectory Segmenter (C7)

pub mod models;
pub mod services;
pub mod spatial;
pub mod store;
