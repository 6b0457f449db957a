//! Location domain model.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::chronology::DateType;
use crate::services::liveness::ClassifiedLocation;

/// A single geo-tagged point in a user's location history.
///
/// `local_timestamp` is the same instant as `captured_at`, expressed in the
/// UTC offset the device reported when it recorded the point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub id: i64,
    pub owner_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub local_timestamp: DateTime<FixedOffset>,
    pub time_zone_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub activity_type_id: Option<i32>,
}

impl LocationRecord {
    /// Ordering key for "most recent": local instant first, then id.
    ///
    /// The instant has microsecond precision, matching what the database
    /// stores. Two records captured in the same instant resolve to the
    /// higher id, which is the later write.
    pub fn recency_key(&self) -> (i64, i64) {
        (self.local_timestamp.timestamp_micros(), self.id)
    }
}

/// Input for inserting a location into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocation {
    pub owner_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub utc_offset_minutes: i32,
    pub time_zone_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub activity_type_id: Option<i32>,
}

impl NewLocation {
    /// Local offset of the recording, falling back to UTC for offsets chrono rejects.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Materializes the record once the store has assigned an id.
    pub fn into_record(self, id: i64) -> LocationRecord {
        let local_timestamp = self.captured_at.with_timezone(&self.offset());
        LocationRecord {
            id,
            owner_id: self.owner_id,
            captured_at: self.captured_at,
            local_timestamp,
            time_zone_id: self.time_zone_id,
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            altitude: self.altitude,
            speed: self.speed,
            country: self.country,
            region: self.region,
            city: self.city,
            address: self.address,
            notes: self.notes,
            activity_type_id: self.activity_type_id,
        }
    }
}

/// Request payload for recording a location.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateLocationRequest {
    /// Capture instant (RFC 3339).
    pub timestamp: DateTime<Utc>,

    /// Offset of the device clock when the point was recorded.
    #[validate(custom(function = "shared::validation::validate_utc_offset_minutes"))]
    pub utc_offset_minutes: Option<i32>,

    #[validate(length(max = 64, message = "Time zone id must be at most 64 characters"))]
    pub time_zone_id: Option<String>,

    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub latitude: f64,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub longitude: f64,

    #[validate(custom(function = "shared::validation::validate_accuracy"))]
    pub accuracy: Option<f64>,

    pub altitude: Option<f64>,

    #[validate(custom(function = "shared::validation::validate_speed"))]
    pub speed: Option<f64>,

    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,

    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,

    pub activity_type_id: Option<i32>,
}

impl CreateLocationRequest {
    /// Converts the request into store input for the given owner.
    pub fn into_new_location(self, owner_id: Uuid) -> NewLocation {
        NewLocation {
            owner_id,
            captured_at: self.timestamp,
            utc_offset_minutes: self.utc_offset_minutes.unwrap_or(0),
            time_zone_id: self.time_zone_id,
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            altitude: self.altitude,
            speed: self.speed,
            country: self.country,
            region: self.region,
            city: self.city,
            address: self.address,
            notes: self.notes,
            activity_type_id: self.activity_type_id,
        }
    }
}

/// Request payload for deleting several locations at once.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteRequest {
    #[validate(length(min = 1, max = 1000, message = "Provide between 1 and 1000 ids"))]
    pub ids: Vec<i64>,
}

/// Response for a bulk delete.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteResponse {
    pub success: bool,
    pub deleted_count: u64,
}

/// Aggregates over a chronological window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationStats {
    pub total_locations: i64,
    pub countries_visited: i64,
    pub regions_visited: i64,
    pub cities_visited: i64,
}

/// Viewport query for the caller's own history.
///
/// Field names follow the map client's bounds object.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "PascalCase")]
pub struct ViewportRequest {
    #[serde(alias = "minLng")]
    pub min_lng: f64,
    #[serde(alias = "minLat")]
    pub min_lat: f64,
    #[serde(alias = "maxLng")]
    pub max_lng: f64,
    #[serde(alias = "maxLat")]
    pub max_lat: f64,
    #[serde(alias = "zoomLevel", default)]
    #[validate(custom(function = "shared::validation::validate_zoom_level"))]
    pub zoom_level: i32,
    #[serde(alias = "userIds", default)]
    pub user_ids: Vec<Uuid>,
    #[serde(alias = "dateType")]
    pub date_type: Option<DateType>,
    #[serde(alias = "year")]
    pub year: Option<i32>,
    #[serde(alias = "month")]
    pub month: Option<u32>,
    #[serde(alias = "day")]
    pub day: Option<u32>,
}

/// Viewport query results. `zoomLevel` is echoed for client-side clustering.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportResponse {
    pub results: Vec<ClassifiedLocation>,
    pub total_items: usize,
    pub zoom_level: i32,
}

/// Request for the latest location of selected group members.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupLatestRequest {
    #[serde(default)]
    pub include_user_ids: Vec<Uuid>,
}
