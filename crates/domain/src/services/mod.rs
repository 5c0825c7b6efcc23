//! Domain services: business logic that operates purely on domain models,
//! independent of the store and HTTP layers above it.

pub mod admission;
pub mod device_tracker;
pub mod geofence_index;
pub mod trajectory_segmenter;

pub use admission::{
    check_admission, derive_identifier, limits_for, AdmissionCacheError, AdmissionDecision,
    InProcessLimiter, TierLimits, Window, WindowCounter,
};
pub use device_tracker::{transition, DeviceMembership, Transition};
pub use geofence_index::GeofenceIndex;
pub use trajectory_segmenter::{append, open_or_new, GAP_THRESHOLD};
