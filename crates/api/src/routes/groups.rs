//! Group management and invitation handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::group::{
    CreateGroupRequest, CreateInvitationRequest, Group, GroupInvitation, GroupSummary,
    InvitationView, ListMembersResponse, MemberView, PeerVisibilityRequest,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

/// Create a group owned by the caller.
///
/// POST /api/v1/groups
pub async fn create_group(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Json(request): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    request.validate()?;

    let group = state
        .groups
        .create_group(&user_auth.caller(), request)
        .await?;

    Ok((StatusCode::CREATED, Json(group)))
}

/// Groups where the caller is an active member.
///
/// GET /api/v1/groups
pub async fn list_groups(
    State(state): State<AppState>,
    user_auth: UserAuth,
) -> Result<Json<Vec<GroupSummary>>, ApiError> {
    let groups = state.groups.list_groups(&user_auth.caller()).await?;
    Ok(Json(groups))
}

/// Members visible to the caller. Owners also see pending rows and every
/// member regardless of peer-visibility opt-outs.
///
/// GET /api/v1/groups/:group_id/members
pub async fn list_members(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path(group_id): Path<Uuid>,
) -> Result<Json<ListMembersResponse>, ApiError> {
    let members = state
        .groups
        .list_members(&user_auth.caller(), group_id)
        .await?;
    Ok(Json(members))
}

/// Remove a member; any member may remove themselves.
///
/// DELETE /api/v1/groups/:group_id/members/:user_id
pub async fn remove_member(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state
        .groups
        .remove_member(&user_auth.caller(), group_id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/groups/:group_id/members/:user_id/org-peer-visibility-access
pub async fn set_peer_visibility(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<PeerVisibilityRequest>,
) -> Result<Json<MemberView>, ApiError> {
    let member = state
        .groups
        .set_peer_visibility(&user_auth.caller(), group_id, user_id, request.disabled)
        .await?;
    Ok(Json(member))
}

/// Invite a user by username. Owner only.
///
/// POST /api/v1/groups/:group_id/invitations
pub async fn create_invitation(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path(group_id): Path<Uuid>,
    Json(request): Json<CreateInvitationRequest>,
) -> Result<(StatusCode, Json<GroupInvitation>), ApiError> {
    request.validate()?;

    let invitation = state
        .groups
        .invite(&user_auth.caller(), group_id, &request.username)
        .await?;

    Ok((StatusCode::CREATED, Json(invitation)))
}

/// DELETE /api/v1/groups/:group_id/invitations/:invitation_id
pub async fn revoke_invitation(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path((group_id, invitation_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<GroupInvitation>, ApiError> {
    let invitation = state
        .groups
        .revoke(&user_auth.caller(), group_id, invitation_id)
        .await?;
    Ok(Json(invitation))
}

/// Pending invitations addressed to the caller.
///
/// GET /api/v1/invitations
pub async fn list_invitations(
    State(state): State<AppState>,
    user_auth: UserAuth,
) -> Result<Json<Vec<InvitationView>>, ApiError> {
    let invitations = state
        .groups
        .pending_invitations(&user_auth.caller())
        .await?;
    Ok(Json(invitations))
}

/// POST /api/v1/invitations/:invitation_id/accept
pub async fn accept_invitation(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path(invitation_id): Path<Uuid>,
) -> Result<Json<GroupInvitation>, ApiError> {
    let invitation = state
        .groups
        .accept(&user_auth.caller(), invitation_id)
        .await?;

    info!(
        user_id = %user_auth.user_id,
        group_id = %invitation.group_id,
        "Invitation accepted"
    );

    Ok(Json(invitation))
}

/// POST /api/v1/invitations/:invitation_id/decline
pub async fn decline_invitation(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path(invitation_id): Path<Uuid>,
) -> Result<Json<GroupInvitation>, ApiError> {
    let invitation = state
        .groups
        .decline(&user_auth.caller(), invitation_id)
        .await?;
    Ok(Json(invitation))
}
