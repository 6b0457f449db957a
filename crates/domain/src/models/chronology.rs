//! Chronological window types (day / month / year selectors).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::location::LocationStats;
use crate::services::liveness::ClassifiedLocation;

/// Granularity of a chronological window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateType {
    #[serde(alias = "Day", alias = "DAY")]
    Day,
    #[serde(alias = "Month", alias = "MONTH")]
    Month,
    #[serde(alias = "Year", alias = "YEAR")]
    Year,
}

impl DateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateType::Day => "day",
            DateType::Month => "month",
            DateType::Year => "year",
        }
    }
}

impl fmt::Display for DateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A (dateType, year, month?, day?) selector as sent by clients.
///
/// Components not required by the granularity are ignored; missing
/// required ones are rejected when the selector is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateSelector {
    pub date_type: DateType,
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl DateSelector {
    pub fn day(year: i32, month: u32, day: u32) -> Self {
        Self {
            date_type: DateType::Day,
            year,
            month: Some(month),
            day: Some(day),
        }
    }

    pub fn month(year: i32, month: u32) -> Self {
        Self {
            date_type: DateType::Month,
            year,
            month: Some(month),
            day: None,
        }
    }

    pub fn year(year: i32) -> Self {
        Self {
            date_type: DateType::Year,
            year,
            month: None,
            day: None,
        }
    }

    /// Selector for the calendar day containing `date`.
    pub fn for_date(date: NaiveDate) -> Self {
        use chrono::Datelike;
        Self::day(date.year(), date.month(), date.day())
    }
}

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Query string for chronological endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChronologicalQuery {
    pub date_type: DateType,
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl From<ChronologicalQuery> for DateSelector {
    fn from(query: ChronologicalQuery) -> Self {
        Self {
            date_type: query.date_type,
            year: query.year,
            month: query.month,
            day: query.day,
        }
    }
}

/// Query string for the has-data check.
#[derive(Debug, Clone, Deserialize)]
pub struct HasDataQuery {
    /// Calendar date, `YYYY-MM-DD`.
    pub date: NaiveDate,
}

/// Response for the chronological listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChronologicalResponse {
    pub success: bool,
    pub data: Vec<ClassifiedLocation>,
    pub total_items: usize,
    pub date_type: DateType,
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
}

/// Response for the has-data check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HasDataResponse {
    pub has_data: bool,
}

/// Response for window statistics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub success: bool,
    pub stats: LocationStats,
}

/// Which neighbouring periods the client may navigate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationAvailability {
    pub can_navigate_prev_day: bool,
    pub can_navigate_next_day: bool,
    pub can_navigate_prev_month: bool,
    pub can_navigate_next_month: bool,
    pub can_navigate_prev_year: bool,
    pub can_navigate_next_year: bool,
}

/// Response for navigation availability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationAvailabilityResponse {
    pub success: bool,
    #[serde(flatten)]
    pub availability: NavigationAvailability,
}
