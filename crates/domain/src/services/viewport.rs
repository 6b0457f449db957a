//! Map viewport filtering.

use chrono::NaiveDate;
use geo::{coord, Intersects, Rect};

use crate::error::DomainError;
use crate::models::chronology::{DateRange, DateSelector, DateType};
use crate::models::location::{LocationRecord, ViewportRequest};
use crate::services::chronology;

/// A validated WGS84 bounding box. Containment is boundary-inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Validates ranges and ordering.
    ///
    /// Boxes crossing the antimeridian (`min_lng > max_lng`) are rejected.
    pub fn new(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> Result<Self, DomainError> {
        let values = [min_lng, min_lat, max_lng, max_lat];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DomainError::Validation(
                "Bounding box coordinates must be finite numbers".to_string(),
            ));
        }
        if !(-180.0..=180.0).contains(&min_lng) || !(-180.0..=180.0).contains(&max_lng) {
            return Err(DomainError::Validation(
                "Longitude must be between -180 and 180".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&min_lat) || !(-90.0..=90.0).contains(&max_lat) {
            return Err(DomainError::Validation(
                "Latitude must be between -90 and 90".to_string(),
            ));
        }
        if min_lng > max_lng || min_lat > max_lat {
            return Err(DomainError::Validation(
                "Bounding box minimum must not exceed its maximum".to_string(),
            ));
        }

        Ok(Self {
            min_lng,
            min_lat,
            max_lng,
            max_lat,
        })
    }

    pub fn from_request(request: &ViewportRequest) -> Result<Self, DomainError> {
        Self::new(
            request.min_lng,
            request.min_lat,
            request.max_lng,
            request.max_lat,
        )
    }

    fn rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_lng, y: self.min_lat },
            coord! { x: self.max_lng, y: self.max_lat },
        )
    }

    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        self.rect().intersects(&coord! { x: longitude, y: latitude })
    }

    pub fn contains_record(&self, record: &LocationRecord) -> bool {
        self.contains(record.longitude, record.latitude)
    }
}

/// Extracts the optional date filter of a viewport request.
pub fn selector_from_request(request: &ViewportRequest) -> Result<Option<DateSelector>, DomainError> {
    let Some(date_type) = request.date_type else {
        return Ok(None);
    };
    let year = request
        .year
        .ok_or(DomainError::MissingDateComponent("year"))?;

    Ok(Some(DateSelector {
        date_type,
        year,
        month: request.month,
        day: request.day,
    }))
}

/// Date range applied to a viewport query over `subject_count` subjects.
///
/// A single subject may use any granularity or none. Several subjects are
/// limited to one day, defaulting to the viewer's `today`.
pub fn effective_range(
    selector: Option<&DateSelector>,
    subject_count: usize,
    today: NaiveDate,
) -> Result<Option<DateRange>, DomainError> {
    if subject_count > 1 {
        return match selector {
            None => chronology::day_range(today).map(Some),
            Some(selector) if selector.date_type == DateType::Day => {
                chronology::resolve(selector).map(Some)
            }
            Some(selector) => Err(DomainError::Validation(format!(
                "dateType '{}' is not supported when querying several users; use 'day'",
                selector.date_type
            ))),
        };
    }

    selector.map(chronology::resolve).transpose()
}
