//! Location entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::location::{LocationRecord, LocationStats, NewLocation};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the locations table.
#[derive(Debug, Clone, FromRow)]
pub struct LocationEntity {
    pub id: i64,
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

impl From<LocationEntity> for LocationRecord {
    fn from(entity: LocationEntity) -> Self {
        let id = entity.id;
        NewLocation {
            owner_id: entity.owner_id,
            captured_at: entity.captured_at,
            utc_offset_minutes: entity.utc_offset_minutes,
            time_zone_id: entity.time_zone_id,
            latitude: entity.latitude,
            longitude: entity.longitude,
            accuracy: entity.accuracy,
            altitude: entity.altitude,
            speed: entity.speed,
            country: entity.country,
            region: entity.region,
            city: entity.city,
            address: entity.address,
            notes: entity.notes,
            activity_type_id: entity.activity_type_id,
        }
        .into_record(id)
    }
}

/// Aggregate row for location statistics.
#[derive(Debug, Clone, FromRow)]
pub struct LocationStatsEntity {
    pub total_locations: i64,
    pub countries_visited: i64,
    pub regions_visited: i64,
    pub cities_visited: i64,
}

impl From<LocationStatsEntity> for LocationStats {
    fn from(entity: LocationStatsEntity) -> Self {
        Self {
            total_locations: entity.total_locations,
            countries_visited: entity.countries_visited,
            regions_visited: entity.regions_visited,
            cities_visited: entity.cities_visited,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_entity_restores_local_offset() {
        let entity = LocationEntity {
            id: 42,
            owner_id: Uuid::nil(),
            captured_at: Utc.with_ymd_and_hms(2024, 7, 1, 22, 30, 0).unwrap(),
            utc_offset_minutes: 120,
            time_zone_id: Some("Europe/Bratislava".to_string()),
            latitude: 48.14,
            longitude: 17.1,
            accuracy: None,
            altitude: None,
            speed: None,
            country: Some("Slovakia".to_string()),
            region: None,
            city: None,
            address: None,
            notes: None,
            activity_type_id: Some(3),
        };

        let record: LocationRecord = entity.into();
        assert_eq!(record.id, 42);
        assert_eq!(record.local_timestamp.to_rfc3339(), "2024-07-02T00:30:00+02:00");
        assert_eq!(record.activity_type_id, Some(3));
    }
}
