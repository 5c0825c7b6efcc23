//! Database entity definitions.
//!
//! Entities are direct mappings to database rows; the `domain` crate never
//! depends on `sqlx` types, so conversions live here behind `From`/`TryFrom`.

pub mod device;
pub mod geofence;
pub mod trajectory;
pub mod trajectory_point;
pub mod user;

pub use device::DeviceEntity;
pub use geofence::GeofenceEntity;
pub use trajectory::TrajectoryEntity;
pub use trajectory_point::TrajectoryPointEntity;
pub use user::UserEntity;
