//! Chronological window resolution and navigation.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::DomainError;
use crate::models::chronology::{DateRange, DateSelector, DateType, NavigationAvailability};

const MIN_YEAR: i32 = 1;
const MAX_YEAR: i32 = 9999;

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn invalid(selector: &DateSelector) -> DomainError {
    DomainError::InvalidDate(format!(
        "{} {:04}-{:02}-{:02}",
        selector.date_type,
        selector.year,
        selector.month.unwrap_or(1),
        selector.day.unwrap_or(1)
    ))
}

fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    first_of_month(next_year, next_month)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
}

/// First calendar day covered by the selector.
fn anchor(selector: &DateSelector) -> Result<NaiveDate, DomainError> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&selector.year) {
        return Err(invalid(selector));
    }

    match selector.date_type {
        DateType::Day => {
            let month = selector
                .month
                .ok_or(DomainError::MissingDateComponent("month"))?;
            let day = selector.day.ok_or(DomainError::MissingDateComponent("day"))?;
            NaiveDate::from_ymd_opt(selector.year, month, day).ok_or_else(|| invalid(selector))
        }
        DateType::Month => {
            let month = selector
                .month
                .ok_or(DomainError::MissingDateComponent("month"))?;
            first_of_month(selector.year, month).ok_or_else(|| invalid(selector))
        }
        DateType::Year => {
            NaiveDate::from_ymd_opt(selector.year, 1, 1).ok_or_else(|| invalid(selector))
        }
    }
}

/// Resolves a selector into a half-open UTC range covering exactly one
/// calendar day, month or year.
pub fn resolve(selector: &DateSelector) -> Result<DateRange, DomainError> {
    let start = anchor(selector)?;
    let end = match selector.date_type {
        DateType::Day => start.succ_opt(),
        DateType::Month => shift_date(start, DateType::Month, 1),
        DateType::Year => NaiveDate::from_ymd_opt(start.year() + 1, 1, 1),
    }
    .ok_or_else(|| invalid(selector))?;

    Ok(DateRange {
        start: midnight_utc(start),
        end: midnight_utc(end),
    })
}

/// Range covering a single calendar day.
pub fn day_range(date: NaiveDate) -> Result<DateRange, DomainError> {
    resolve(&DateSelector::for_date(date))
}

/// Moves `date` by `delta` units.
///
/// Month and year shifts keep the day of month, clamped to the last day of
/// the target month (Jan 31 + 1 month is Feb 28 or 29).
pub fn shift_date(date: NaiveDate, unit: DateType, delta: i32) -> Option<NaiveDate> {
    match unit {
        DateType::Day => date.checked_add_signed(Duration::days(i64::from(delta))),
        DateType::Month | DateType::Year => {
            let months = if unit == DateType::Month {
                delta
            } else {
                delta.checked_mul(12)?
            };
            let index = date.year() * 12 + date.month0() as i32 + months;
            let year = index.div_euclid(12);
            let month = index.rem_euclid(12) as u32 + 1;
            let day = date.day().min(last_day_of_month(year, month)?);
            NaiveDate::from_ymd_opt(year, month, day)
        }
    }
}

/// Moves a selector by one period of its own granularity.
pub fn step(selector: &DateSelector, delta: i32) -> Result<DateSelector, DomainError> {
    let start = anchor(selector)?;
    let target = shift_date(start, selector.date_type, delta).ok_or_else(|| invalid(selector))?;
    Ok(match selector.date_type {
        DateType::Day => DateSelector::for_date(target),
        DateType::Month => DateSelector::month(target.year(), target.month()),
        DateType::Year => DateSelector::year(target.year()),
    })
}

/// "Today" as seen from the viewer's local frame.
pub fn viewer_today(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Which neighbouring periods may be opened from `selector`.
///
/// Backwards is always allowed. Forwards is allowed while the target is not
/// after `today`: the landing date for day views, the first day of the
/// target period otherwise. Data presence is not consulted.
pub fn navigation_availability(
    selector: &DateSelector,
    today: NaiveDate,
) -> Result<NavigationAvailability, DomainError> {
    let start = anchor(selector)?;

    let next_day = start.succ_opt();
    // A day view keeps its day of month when stepping a month or year, so the
    // landing date itself must not be in the future.
    let (next_month, next_year) = match selector.date_type {
        DateType::Day => (
            shift_date(start, DateType::Month, 1),
            shift_date(start, DateType::Year, 1),
        ),
        DateType::Month | DateType::Year => (
            shift_date(start, DateType::Month, 1).and_then(|d| d.with_day(1)),
            NaiveDate::from_ymd_opt(start.year() + 1, 1, 1),
        ),
    };

    let reachable = |target: Option<NaiveDate>| target.is_some_and(|first| first <= today);

    Ok(NavigationAvailability {
        can_navigate_prev_day: true,
        can_navigate_next_day: reachable(next_day),
        can_navigate_prev_month: true,
        can_navigate_next_month: reachable(next_month),
        can_navigate_prev_year: true,
        can_navigate_next_year: reachable(next_year),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_resolve_leap_february() {
        let range = resolve(&DateSelector::month(2024, 2)).unwrap();
        assert_eq!(range.start, midnight_utc(date(2024, 2, 1)));
        assert_eq!(range.end, midnight_utc(date(2024, 3, 1)));
        assert!(range.contains(midnight_utc(date(2024, 2, 29))));
        assert!(!range.contains(range.end));
    }

    #[test]
    fn test_resolve_day_and_year() {
        let day = resolve(&DateSelector::day(2023, 12, 31)).unwrap();
        assert_eq!(day.start, midnight_utc(date(2023, 12, 31)));
        assert_eq!(day.end, midnight_utc(date(2024, 1, 1)));

        let year = resolve(&DateSelector::year(2024)).unwrap();
        assert_eq!(year.start, midnight_utc(date(2024, 1, 1)));
        assert_eq!(year.end, midnight_utc(date(2025, 1, 1)));
    }

    #[test]
    fn test_resolve_december_rolls_year() {
        let range = resolve(&DateSelector::month(2023, 12)).unwrap();
        assert_eq!(range.end, midnight_utc(date(2024, 1, 1)));
    }

    #[test]
    fn test_resolve_missing_components() {
        let mut selector = DateSelector::day(2024, 3, 1);
        selector.day = None;
        assert!(matches!(
            resolve(&selector),
            Err(DomainError::MissingDateComponent("day"))
        ));

        let mut selector = DateSelector::month(2024, 3);
        selector.month = None;
        assert!(matches!(
            resolve(&selector),
            Err(DomainError::MissingDateComponent("month"))
        ));
    }

    #[test]
    fn test_resolve_invalid_components() {
        assert!(matches!(
            resolve(&DateSelector::day(2024, 2, 30)),
            Err(DomainError::InvalidDate(_))
        ));
        assert!(matches!(
            resolve(&DateSelector::month(2024, 13)),
            Err(DomainError::InvalidDate(_))
        ));
        assert!(matches!(
            resolve(&DateSelector::year(0)),
            Err(DomainError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_year_selector_ignores_extra_components() {
        let selector = DateSelector {
            date_type: DateType::Year,
            year: 2022,
            month: Some(14),
            day: Some(40),
        };
        assert!(resolve(&selector).is_ok());
    }

    #[test]
    fn test_shift_clamps_day_of_month() {
        assert_eq!(
            shift_date(date(2024, 1, 31), DateType::Month, 1),
            Some(date(2024, 2, 29))
        );
        assert_eq!(
            shift_date(date(2023, 1, 31), DateType::Month, 1),
            Some(date(2023, 2, 28))
        );
        assert_eq!(
            shift_date(date(2024, 3, 31), DateType::Month, -1),
            Some(date(2024, 2, 29))
        );
        assert_eq!(
            shift_date(date(2024, 2, 29), DateType::Year, 1),
            Some(date(2025, 2, 28))
        );
        assert_eq!(
            shift_date(date(2024, 1, 15), DateType::Month, -1),
            Some(date(2023, 12, 15))
        );
    }

    #[test]
    fn test_step_by_own_granularity() {
        assert_eq!(
            step(&DateSelector::day(2024, 2, 28), 1).unwrap(),
            DateSelector::day(2024, 2, 29)
        );
        assert_eq!(
            step(&DateSelector::month(2024, 1), -1).unwrap(),
            DateSelector::month(2023, 12)
        );
        assert_eq!(
            step(&DateSelector::year(2024), 1).unwrap(),
            DateSelector::year(2025)
        );
    }

    #[test]
    fn test_navigation_blocks_future_only() {
        let today = date(2024, 6, 15);

        let nav = navigation_availability(&DateSelector::day(2024, 6, 15), today).unwrap();
        assert!(nav.can_navigate_prev_day);
        assert!(nav.can_navigate_prev_month);
        assert!(nav.can_navigate_prev_year);
        assert!(!nav.can_navigate_next_day);
        assert!(!nav.can_navigate_next_month);
        assert!(!nav.can_navigate_next_year);

        let nav = navigation_availability(&DateSelector::day(2024, 6, 14), today).unwrap();
        assert!(nav.can_navigate_next_day);
        assert!(!nav.can_navigate_next_month);

        let nav = navigation_availability(&DateSelector::month(2024, 5), today).unwrap();
        assert!(nav.can_navigate_next_month);

        let nav = navigation_availability(&DateSelector::year(2023), today).unwrap();
        assert!(nav.can_navigate_next_year);
    }

    #[test]
    fn test_day_view_month_and_year_steps_check_landing_date() {
        let nav = navigation_availability(&DateSelector::day(2024, 6, 15), date(2024, 7, 10))
            .unwrap();
        assert!(nav.can_navigate_next_day);
        assert!(!nav.can_navigate_next_month);

        let nav = navigation_availability(&DateSelector::day(2024, 6, 15), date(2024, 7, 15))
            .unwrap();
        assert!(nav.can_navigate_next_month);

        let nav = navigation_availability(&DateSelector::day(2023, 6, 15), date(2024, 3, 1))
            .unwrap();
        assert!(!nav.can_navigate_next_year);

        let nav = navigation_availability(&DateSelector::day(2023, 6, 15), date(2024, 6, 15))
            .unwrap();
        assert!(nav.can_navigate_next_year);
    }

    #[test]
    fn test_day_view_month_step_clamps_before_comparing() {
        // Jan 31 lands on Feb 29 in a leap year.
        let nav = navigation_availability(&DateSelector::day(2024, 1, 31), date(2024, 2, 29))
            .unwrap();
        assert!(nav.can_navigate_next_month);

        let nav = navigation_availability(&DateSelector::day(2024, 1, 31), date(2024, 2, 28))
            .unwrap();
        assert!(!nav.can_navigate_next_month);
    }

    #[test]
    fn test_month_view_only_needs_first_of_next_period() {
        let nav = navigation_availability(&DateSelector::month(2024, 6), date(2024, 7, 1)).unwrap();
        assert!(nav.can_navigate_next_month);
        assert!(!nav.can_navigate_next_year);

        let nav = navigation_availability(&DateSelector::year(2023), date(2024, 1, 1)).unwrap();
        assert!(nav.can_navigate_next_year);
    }

    #[test]
    fn test_navigation_from_far_past_allows_everything() {
        let nav = navigation_availability(&DateSelector::day(2001, 1, 1), date(2024, 6, 15))
            .unwrap();
        assert!(nav.can_navigate_next_day);
        assert!(nav.can_navigate_next_month);
        assert!(nav.can_navigate_next_year);
    }

    #[test]
    fn test_navigation_rejects_invalid_selector() {
        assert!(navigation_availability(&DateSelector::day(2024, 2, 30), date(2024, 6, 1)).is_err());
    }

    #[test]
    fn test_viewer_today_uses_offset() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 23, 30, 0).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let prague = FixedOffset::east_opt(2 * 3600).unwrap();
        let new_york = FixedOffset::west_opt(4 * 3600).unwrap();

        assert_eq!(viewer_today(now, utc), date(2024, 6, 15));
        assert_eq!(viewer_today(now, prague), date(2024, 6, 16));
        assert_eq!(viewer_today(now, new_york), date(2024, 6, 15));
    }
}
