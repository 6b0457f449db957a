//! The caller's tracking settings.

use axum::{extract::State, Json};
use domain::models::user::{SettingsResponse, UpdateSettingsRequest};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

/// GET /api/v1/users/me/settings
pub async fn get_settings(
    State(state): State<AppState>,
    user_auth: UserAuth,
) -> Result<Json<SettingsResponse>, ApiError> {
    let settings = state.tracking.settings(&user_auth.caller()).await?;
    Ok(Json(settings))
}

/// Partially update settings; absent fields keep their value.
///
/// PUT /api/v1/users/me/settings
pub async fn update_settings(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<SettingsResponse>, ApiError> {
    request.validate()?;

    let settings = state
        .tracking
        .update_settings(&user_auth.caller(), &request)
        .await?;

    Ok(Json(settings))
}
