//! User repository for database operations.

use async_trait::async_trait;
use domain::models::user::{User, UserSettings};
use domain::services::{StoreError, UserDirectory};
use sqlx::PgPool;
use uuid::Uuid;

use super::store_error;
use crate::entities::{UserEntity, UserSettingsEntity};
use crate::metrics::QueryTimer;

/// Repository for users and their settings.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let timer = QueryTimer::new("find_user_by_id");
        let result = sqlx::query_as::<_, UserEntity>(
            "SELECT id, username, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(store_error)?.map(Into::into))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let timer = QueryTimer::new("find_user_by_username");
        let result = sqlx::query_as::<_, UserEntity>(
            "SELECT id, username, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(store_error)?.map(Into::into))
    }

    async fn ensure_user(&self, user_id: Uuid, username: &str) -> Result<User, StoreError> {
        let timer = QueryTimer::new("ensure_user");
        // A username held by another id trips the unique index and surfaces as Conflict.
        let result = sqlx::query_as::<_, UserEntity>(
            r#"
            INSERT INTO users (id, username)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET username = EXCLUDED.username
            RETURNING id, username, created_at
            "#,
        )
        .bind(user_id)
        .bind(username)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result.map(Into::into).map_err(store_error)
    }

    async fn settings(&self, user_id: Uuid) -> Result<UserSettings, StoreError> {
        let timer = QueryTimer::new("find_user_settings");
        let result = sqlx::query_as::<_, UserSettingsEntity>(
            r#"
            SELECT user_id, public_timeline_enabled, location_time_threshold_minutes, utc_offset_minutes
            FROM user_settings
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        Ok(result
            .map_err(store_error)?
            .map(Into::into)
            .unwrap_or_default())
    }

    async fn upsert_settings(
        &self,
        user_id: Uuid,
        settings: &UserSettings,
    ) -> Result<UserSettings, StoreError> {
        let timer = QueryTimer::new("upsert_user_settings");
        let result = sqlx::query_as::<_, UserSettingsEntity>(
            r#"
            INSERT INTO user_settings (
                user_id, public_timeline_enabled, location_time_threshold_minutes, utc_offset_minutes
            )
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                public_timeline_enabled = EXCLUDED.public_timeline_enabled,
                location_time_threshold_minutes = EXCLUDED.location_time_threshold_minutes,
                utc_offset_minutes = EXCLUDED.utc_offset_minutes,
                updated_at = NOW()
            RETURNING user_id, public_timeline_enabled, location_time_threshold_minutes, utc_offset_minutes
            "#,
        )
        .bind(user_id)
        .bind(settings.public_timeline_enabled)
        .bind(settings.location_time_threshold_minutes)
        .bind(settings.utc_offset_minutes)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result.map(Into::into).map_err(store_error)
    }
}
