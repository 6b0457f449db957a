//! Chronological history of the caller's own locations.

use axum::{
    extract::{Query, State},
    Json,
};
use domain::models::chronology::{
    ChronologicalQuery, ChronologicalResponse, DateSelector, HasDataQuery, HasDataResponse,
    NavigationAvailabilityResponse, StatsResponse,
};
use tracing::debug;

use super::request_cancellation;
use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

/// Locations within one calendar day, month or year.
///
/// GET /api/v1/chronological?dateType&year&month&day
pub async fn get_chronological(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Query(query): Query<ChronologicalQuery>,
) -> Result<Json<ChronologicalResponse>, ApiError> {
    let selector = DateSelector::from(query);
    let (cancel, _guard) = request_cancellation();

    let data = state
        .tracking
        .chronological(&user_auth.caller(), &selector, &cancel)
        .await?;

    debug!(
        user_id = %user_auth.user_id,
        date_type = %selector.date_type,
        year = selector.year,
        count = data.len(),
        "Chronological query served"
    );

    Ok(Json(ChronologicalResponse {
        success: true,
        total_items: data.len(),
        data,
        date_type: selector.date_type,
        year: selector.year,
        month: selector.month,
        day: selector.day,
    }))
}

/// GET /api/v1/chronological/has-data?date=YYYY-MM-DD
pub async fn has_data(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Query(query): Query<HasDataQuery>,
) -> Result<Json<HasDataResponse>, ApiError> {
    let (cancel, _guard) = request_cancellation();
    let has_data = state
        .tracking
        .has_data(&user_auth.caller(), query.date, &cancel)
        .await?;
    Ok(Json(HasDataResponse { has_data }))
}

/// GET /api/v1/chronological/stats?dateType&year&month&day
pub async fn get_stats(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Query(query): Query<ChronologicalQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    let selector = DateSelector::from(query);
    let (cancel, _guard) = request_cancellation();
    let stats = state
        .tracking
        .stats(&user_auth.caller(), &selector, &cancel)
        .await?;
    Ok(Json(StatsResponse {
        success: true,
        stats,
    }))
}

/// Which neighbouring periods may be navigated to from the given one.
///
/// GET /api/v1/chronological/nav-availability?dateType&year&month&day
pub async fn nav_availability(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Query(query): Query<ChronologicalQuery>,
) -> Result<Json<NavigationAvailabilityResponse>, ApiError> {
    let selector = DateSelector::from(query);
    let availability = state
        .tracking
        .navigation(&user_auth.caller(), &selector)
        .await?;
    Ok(Json(NavigationAvailabilityResponse {
        success: true,
        availability,
    }))
}
