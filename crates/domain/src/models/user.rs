//! User and per-user settings models.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A user known to the service.
///
/// Accounts are provisioned by the identity provider; the service only
/// records the id/username pair it sees in tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// The authenticated identity behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub username: String,
}

impl Caller {
    pub fn new(user_id: Uuid, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}

/// Per-user settings consulted by liveness, chronology and visibility.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub public_timeline_enabled: bool,
    pub location_time_threshold_minutes: Option<i32>,
    pub utc_offset_minutes: i32,
}

impl UserSettings {
    /// Liveness threshold, falling back to `default` when unset or non-positive.
    pub fn threshold_or(&self, default: i32) -> i32 {
        match self.location_time_threshold_minutes {
            Some(minutes) if minutes > 0 => minutes,
            _ => default,
        }
    }

    /// The user's local frame for "today".
    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

/// Request payload for updating settings. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub public_timeline_enabled: Option<bool>,

    #[validate(custom(function = "shared::validation::validate_threshold_minutes"))]
    pub location_time_threshold_minutes: Option<i32>,

    /// Clears a stored threshold so the service default applies again.
    #[serde(default)]
    pub clear_location_time_threshold: bool,

    #[validate(custom(function = "shared::validation::validate_utc_offset_minutes"))]
    pub utc_offset_minutes: Option<i32>,
}

impl UpdateSettingsRequest {
    /// Applies the update on top of `current`.
    pub fn apply(&self, current: UserSettings) -> UserSettings {
        let mut next = current;
        if let Some(enabled) = self.public_timeline_enabled {
            next.public_timeline_enabled = enabled;
        }
        if self.clear_location_time_threshold {
            next.location_time_threshold_minutes = None;
        } else if let Some(minutes) = self.location_time_threshold_minutes {
            next.location_time_threshold_minutes = Some(minutes);
        }
        if let Some(offset) = self.utc_offset_minutes {
            next.utc_offset_minutes = offset;
        }
        next
    }
}

/// Response for settings reads and writes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    #[serde(flatten)]
    pub settings: UserSettings,
    /// Threshold actually in effect after applying the service default.
    pub effective_threshold_minutes: i32,
}
