//! User entity (database row mapping).
//!
//! Users are created by an external auth subsystem (§3 Non-goals); this
//! store only reads `id`/`tier`/`active`, kept in sync by that subsystem.

use domain::models::{Tier, User};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct UserEntity {
    pub id: Uuid,
    pub tier: String,
    pub active: bool,
}

impl From<UserEntity> for User {
    fn from(e: UserEntity) -> Self {
        Self {
            id: e.id,
            tier: Tier::from_str(&e.tier).unwrap_or(Tier::Free),
            active: e.active,
        }
    }
}
