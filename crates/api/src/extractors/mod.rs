//! Custom Axum extractors.

pub mod identity;

pub use identity::{resolve_tier, AdmissionIdentity, UserId};
