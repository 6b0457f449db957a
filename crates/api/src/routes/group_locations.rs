//! Group map queries.
//!
//! Both handlers restrict results to members the caller may see in the
//! group; asking for anyone outside that set is forbidden.

use axum::{
    extract::{Path, State},
    Json,
};
use domain::models::location::{GroupLatestRequest, ViewportRequest, ViewportResponse};
use domain::services::ClassifiedLocation;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use super::request_cancellation;
use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

/// Latest location of each requested member, or of every visible member
/// when `includeUserIds` is empty.
///
/// POST /api/v1/groups/:group_id/locations/latest
pub async fn latest_locations(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path(group_id): Path<Uuid>,
    Json(request): Json<GroupLatestRequest>,
) -> Result<Json<Vec<ClassifiedLocation>>, ApiError> {
    let max = state.config.limits.max_group_query_user_ids;
    if request.include_user_ids.len() > max {
        return Err(ApiError::Validation(format!(
            "At most {} user ids can be requested",
            max
        )));
    }

    let (cancel, _guard) = request_cancellation();
    let locations = state
        .tracking
        .group_latest(
            &user_auth.caller(),
            group_id,
            &request.include_user_ids,
            &cancel,
        )
        .await?;

    debug!(
        user_id = %user_auth.user_id,
        group_id = %group_id,
        count = locations.len(),
        "Group latest locations served"
    );

    Ok(Json(locations))
}

/// POST /api/v1/groups/:group_id/locations/query
pub async fn query_viewport(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path(group_id): Path<Uuid>,
    Json(request): Json<ViewportRequest>,
) -> Result<Json<ViewportResponse>, ApiError> {
    request.validate()?;

    let (cancel, _guard) = request_cancellation();
    let response = state
        .tracking
        .group_viewport(&user_auth.caller(), group_id, &request, &cancel)
        .await?;

    Ok(Json(response))
}
