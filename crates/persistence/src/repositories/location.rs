//! Location repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::chronology::DateRange;
use domain::models::location::{LocationRecord, LocationStats, NewLocation};
use domain::services::{BoundingBox, LocationStore, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

use super::store_error;
use crate::entities::{LocationEntity, LocationStatsEntity};
use crate::metrics::QueryTimer;

const LOCATION_COLUMNS: &str = "id, owner_id, captured_at, utc_offset_minutes, time_zone_id, \
     latitude, longitude, accuracy, altitude, speed, country, region, city, address, notes, \
     activity_type_id";

/// Repository for location-related database operations.
#[derive(Clone)]
pub struct LocationRepository {
    pool: PgPool,
}

impl LocationRepository {
    /// Creates a new LocationRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LocationStore for LocationRepository {
    async fn insert(&self, location: NewLocation) -> Result<LocationRecord, StoreError> {
        let timer = QueryTimer::new("insert_location");
        let result = sqlx::query_as::<_, LocationEntity>(&format!(
            r#"
            INSERT INTO locations (
                owner_id, captured_at, utc_offset_minutes, time_zone_id, latitude, longitude,
                accuracy, altitude, speed, country, region, city, address, notes, activity_type_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {}
            "#,
            LOCATION_COLUMNS
        ))
        .bind(location.owner_id)
        .bind(location.captured_at)
        .bind(location.utc_offset_minutes)
        .bind(&location.time_zone_id)
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(location.accuracy)
        .bind(location.altitude)
        .bind(location.speed)
        .bind(&location.country)
        .bind(&location.region)
        .bind(&location.city)
        .bind(&location.address)
        .bind(&location.notes)
        .bind(location.activity_type_id)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result.map(Into::into).map_err(store_error)
    }

    async fn delete(&self, owner_id: Uuid, id: i64) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("delete_location");
        let result = sqlx::query("DELETE FROM locations WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await;
        timer.record();
        Ok(result.map_err(store_error)?.rows_affected() > 0)
    }

    async fn delete_many(&self, owner_id: Uuid, ids: &[i64]) -> Result<u64, StoreError> {
        let timer = QueryTimer::new("delete_locations");
        let result = sqlx::query("DELETE FROM locations WHERE owner_id = $1 AND id = ANY($2)")
            .bind(owner_id)
            .bind(ids)
            .execute(&self.pool)
            .await;
        timer.record();
        Ok(result.map_err(store_error)?.rows_affected())
    }

    async fn find_in_range(
        &self,
        owner_id: Uuid,
        range: DateRange,
    ) -> Result<Vec<LocationRecord>, StoreError> {
        let timer = QueryTimer::new("find_locations_in_range");
        let result = sqlx::query_as::<_, LocationEntity>(&format!(
            r#"
            SELECT {}
            FROM locations
            WHERE owner_id = $1 AND captured_at >= $2 AND captured_at < $3
            ORDER BY captured_at ASC, id ASC
            "#,
            LOCATION_COLUMNS
        ))
        .bind(owner_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        Ok(result
            .map_err(store_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn stats_in_range(
        &self,
        owner_id: Uuid,
        range: DateRange,
    ) -> Result<LocationStats, StoreError> {
        let timer = QueryTimer::new("location_stats_in_range");
        let result = sqlx::query_as::<_, LocationStatsEntity>(
            r#"
            SELECT
                COUNT(*) AS total_locations,
                COUNT(DISTINCT NULLIF(TRIM(country), '')) AS countries_visited,
                COUNT(DISTINCT NULLIF(TRIM(region), '')) AS regions_visited,
                COUNT(DISTINCT NULLIF(TRIM(city), '')) AS cities_visited
            FROM locations
            WHERE owner_id = $1 AND captured_at >= $2 AND captured_at < $3
            "#,
        )
        .bind(owner_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result.map(Into::into).map_err(store_error)
    }

    async fn exists_in_range(&self, owner_id: Uuid, range: DateRange) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("location_exists_in_range");
        let result = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM locations
                WHERE owner_id = $1 AND captured_at >= $2 AND captured_at < $3
            )
            "#,
        )
        .bind(owner_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result.map_err(store_error)
    }

    async fn find_in_viewport(
        &self,
        owner_ids: &[Uuid],
        bbox: &BoundingBox,
        range: Option<DateRange>,
    ) -> Result<Vec<LocationRecord>, StoreError> {
        if owner_ids.is_empty() {
            return Ok(Vec::new());
        }

        let timer = QueryTimer::new("find_locations_in_viewport");
        let result = sqlx::query_as::<_, LocationEntity>(&format!(
            r#"
            SELECT {}
            FROM locations
            WHERE owner_id = ANY($1)
              AND longitude BETWEEN $2 AND $4
              AND latitude BETWEEN $3 AND $5
              AND ($6::timestamptz IS NULL OR captured_at >= $6)
              AND ($7::timestamptz IS NULL OR captured_at < $7)
            ORDER BY captured_at ASC, id ASC
            "#,
            LOCATION_COLUMNS
        ))
        .bind(owner_ids)
        .bind(bbox.min_lng)
        .bind(bbox.min_lat)
        .bind(bbox.max_lng)
        .bind(bbox.max_lat)
        .bind(range.map(|r| r.start))
        .bind(range.map(|r| r.end))
        .fetch_all(&self.pool)
        .await;
        timer.record();
        Ok(result
            .map_err(store_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn latest_for_owners(
        &self,
        owner_ids: &[Uuid],
    ) -> Result<Vec<LocationRecord>, StoreError> {
        if owner_ids.is_empty() {
            return Ok(Vec::new());
        }

        let timer = QueryTimer::new("latest_locations_for_owners");
        let result = sqlx::query_as::<_, LocationEntity>(&format!(
            r#"
            SELECT DISTINCT ON (owner_id) {}
            FROM locations
            WHERE owner_id = ANY($1)
            ORDER BY owner_id, captured_at DESC, id DESC
            "#,
            LOCATION_COLUMNS
        ))
        .bind(owner_ids)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        Ok(result
            .map_err(store_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn find_since(
        &self,
        owner_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<LocationRecord>, StoreError> {
        let timer = QueryTimer::new("find_locations_since");
        let result = sqlx::query_as::<_, LocationEntity>(&format!(
            r#"
            SELECT {}
            FROM locations
            WHERE owner_id = $1 AND captured_at >= $2
            ORDER BY captured_at ASC, id ASC
            "#,
            LOCATION_COLUMNS
        ))
        .bind(owner_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        Ok(result
            .map_err(store_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }
}
