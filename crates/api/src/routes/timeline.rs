//! Public timeline of a user who opted in.

use axum::{
    extract::{Path, State},
    Json,
};
use domain::services::ClassifiedLocation;

use super::request_cancellation;
use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::OptionalUserAuth;

/// Records from the subject's current liveness window.
///
/// GET /api/v1/public/timeline/:username
pub async fn public_timeline(
    State(state): State<AppState>,
    OptionalUserAuth(user_auth): OptionalUserAuth,
    Path(username): Path<String>,
) -> Result<Json<Vec<ClassifiedLocation>>, ApiError> {
    let caller = user_auth.map(|auth| auth.caller());
    if caller.is_none() && !state.config.visibility.allow_anonymous_public_timeline {
        return Err(ApiError::Unauthorized(
            "Authentication required".to_string(),
        ));
    }

    let (cancel, _guard) = request_cancellation();
    let locations = state
        .tracking
        .public_timeline(caller.as_ref(), &username, &cancel)
        .await?;

    Ok(Json(locations))
}
