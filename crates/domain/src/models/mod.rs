//! Domain models.
//!
//! Value types for the core's entities (§3) and the request/response DTOs
//! the API crate builds its handlers around.

pub mod device;
pub mod event;
pub mod geofence;
pub mod trajectory;
pub mod trajectory_point;
pub mod user;
pub mod webhook;

pub use device::{
    CreateDeviceRequest, Device, DeviceResponse, LocationUpdateResult, NearbyDeviceResponse,
    NearbyDevicesRequest, UpdateLocationRequest,
};
pub use event::{
    device_channel, geofence_channel, DeliveryAttempt, TransitionEvent, CHANNEL_GLOBAL,
    GEOFENCE_MUTATION_CHANNEL,
};
pub use geofence::{
    CheckPointRequest, CreateGeofenceRequest, EventType, Geofence, GeofenceResponse,
    NearbyGeofenceQuery, ShapeInput, UpdateGeofenceRequest,
};
pub use trajectory::{DeviceStats, StatsQuery, Trajectory, TrajectoryQuery, TrajectoryResponse};
pub use trajectory_point::{
    clamp_heading, BulkLocationFailure, BulkLocationItem, BulkLocationRequest,
    BulkLocationResponse, NewTrajectoryPoint, TrajectoryPoint, MAX_BULK_ITEMS,
};
pub use user::{Tier, User};
pub use webhook::{
    CreateWebhookRequest, CreatedWebhookResponse, WebhookResponse, WebhookStatsQuery,
    WebhookStatsResponse, WebhookSubscription,
};
