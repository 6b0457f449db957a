//! The caller's own location history: ingest, delete and viewport query.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::location::{
    BulkDeleteRequest, BulkDeleteResponse, CreateLocationRequest, ViewportRequest,
    ViewportResponse,
};
use domain::services::ClassifiedLocation;
use validator::Validate;

use super::request_cancellation;
use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

/// Record a location for the caller.
///
/// POST /api/v1/locations
///
/// Publishes a `location-created` event on the caller's location topic and
/// on every group where the caller is visible to peers.
pub async fn create_location(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Json(request): Json<CreateLocationRequest>,
) -> Result<(StatusCode, Json<ClassifiedLocation>), ApiError> {
    request.validate()?;

    let location = state
        .tracking
        .record_location(&user_auth.caller(), request)
        .await?;

    Ok((StatusCode::CREATED, Json(location)))
}

/// DELETE /api/v1/locations/:location_id
pub async fn delete_location(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path(location_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .tracking
        .delete_location(&user_auth.caller(), location_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete several of the caller's locations. Ids owned by others are ignored.
///
/// POST /api/v1/locations/bulk-delete
pub async fn bulk_delete(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Json(request): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    request.validate()?;

    let max = state.config.limits.max_bulk_delete;
    if request.ids.len() > max {
        return Err(ApiError::Validation(format!(
            "At most {} ids can be deleted at once",
            max
        )));
    }

    let deleted_count = state
        .tracking
        .delete_locations(&user_auth.caller(), &request.ids)
        .await?;

    Ok(Json(BulkDeleteResponse {
        success: true,
        deleted_count,
    }))
}

/// The caller's locations inside a map viewport.
///
/// POST /api/v1/locations/query
pub async fn query_viewport(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Json(request): Json<ViewportRequest>,
) -> Result<Json<ViewportResponse>, ApiError> {
    request.validate()?;

    let (cancel, _guard) = request_cancellation();
    let response = state
        .tracking
        .own_viewport(&user_auth.caller(), &request, &cancel)
        .await?;

    Ok(Json(response))
}
