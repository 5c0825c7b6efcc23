//! Geofence repository for database operations.

use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::GeofenceEntity;
use crate::metrics::QueryTimer;

/// Repository for geofence-related database operations.
#[derive(Clone)]
pub struct GeofenceRepository {
    pool: PgPool,
}

impl GeofenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        name: &str,
        vertices: serde_json::Value,
        metadata: Option<serde_json::Value>,
    ) -> Result<GeofenceEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_geofence");
        let result = sqlx::query_as::<_, GeofenceEntity>(
            r#"
            INSERT INTO geofences (geofence_id, user_id, name, vertices, active, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, true, $5, NOW(), NOW())
            RETURNING id, geofence_id, user_id, name, vertices, active, metadata, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(name)
        .bind(vertices)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_by_geofence_id(&self, user_id: Uuid, geofence_id: Uuid) -> Result<Option<GeofenceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_geofence_by_id");
        let result = sqlx::query_as::<_, GeofenceEntity>(
            r#"
            SELECT id, geofence_id, user_id, name, vertices, active, metadata, created_at, updated_at
            FROM geofences
            WHERE user_id = $1 AND geofence_id = $2
            "#,
        )
        .bind(user_id)
        .bind(geofence_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn find_active_by_user(&self, user_id: Uuid) -> Result<Vec<GeofenceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_active_geofences_by_user");
        let result = sqlx::query_as::<_, GeofenceEntity>(
            r#"
            SELECT id, geofence_id, user_id, name, vertices, active, metadata, created_at, updated_at
            FROM geofences
            WHERE user_id = $1 AND active = true
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn count_for_user(&self, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("count_geofences_by_user");
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM geofences WHERE user_id = $1 AND active = true")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        timer.record();
        Ok(count.0)
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        geofence_id: Uuid,
        name: Option<&str>,
        active: Option<bool>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Option<GeofenceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("update_geofence");
        let result = sqlx::query_as::<_, GeofenceEntity>(
            r#"
            UPDATE geofences SET
                name = COALESCE($3, name),
                active = COALESCE($4, active),
                metadata = COALESCE($5, metadata),
                updated_at = NOW()
            WHERE user_id = $1 AND geofence_id = $2
            RETURNING id, geofence_id, user_id, name, vertices, active, metadata, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(geofence_id)
        .bind(name)
        .bind(active)
        .bind(metadata)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    pub async fn delete(&self, user_id: Uuid, geofence_id: Uuid) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("delete_geofence");
        let result = sqlx::query("DELETE FROM geofences WHERE user_id = $1 AND geofence_id = $2")
            .bind(user_id)
            .bind(geofence_id)
            .execute(&self.pool)
            .await?;
        timer.record();
        Ok(result.rows_affected() > 0)
    }

    /// Loads a user's active geofences for an in-process bbox/containment
    /// prefilter — there is no PostGIS index here, so spatial narrowing
    /// happens in the store adapter once vertices are decoded (§4.1, §4.5).
    pub async fn near(&self, user_id: Uuid, limit: i64) -> Result<Vec<GeofenceEntity>, sqlx::Error> {
        let timer = QueryTimer::new("geofences_near");
        let result = sqlx::query_as::<_, GeofenceEntity>(
            r#"
            SELECT id, geofence_id, user_id, name, vertices, active, metadata, created_at, updated_at
            FROM geofences
            WHERE user_id = $1 AND active = true
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_repository_creation() {
        // Actual database behavior is covered by integration tests.
    }
}
