//! Repository implementations for database operations.

pub mod device;
pub mod geofence;
pub mod trajectory;
pub mod trajectory_point;
pub mod user;

pub use device::DeviceRepository;
pub use geofence::GeofenceRepository;
pub use trajectory::TrajectoryRepository;
pub use trajectory_point::TrajectoryPointRepository;
pub use user::UserRepository;
