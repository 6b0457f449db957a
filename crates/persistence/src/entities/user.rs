//! User and settings entities (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::user::{User, UserSettings};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the users table.
#[derive(Debug, Clone, FromRow)]
pub struct UserEntity {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserEntity> for User {
    fn from(entity: UserEntity) -> Self {
        Self {
            id: entity.id,
            username: entity.username,
            created_at: entity.created_at,
        }
    }
}

/// Database row mapping for the user_settings table.
#[derive(Debug, Clone, FromRow)]
pub struct UserSettingsEntity {
    pub user_id: Uuid,
    pub public_timeline_enabled: bool,
    pub location_time_threshold_minutes: Option<i32>,
    pub utc_offset_minutes: i32,
}

impl From<UserSettingsEntity> for UserSettings {
    fn from(entity: UserSettingsEntity) -> Self {
        Self {
            public_timeline_enabled: entity.public_timeline_enabled,
            location_time_threshold_minutes: entity.location_time_threshold_minutes,
            utc_offset_minutes: entity.utc_offset_minutes,
        }
    }
}
