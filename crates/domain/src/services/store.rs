//! Store traits consumed by the domain services.
//!
//! Each method maps to one query shape and returns materialized domain
//! types. Implementations live in `persistence` (PostgreSQL) and in
//! [`super::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::chronology::DateRange;
use crate::models::group::{
    Group, GroupInvitation, GroupMembership, InvitationStatus, NewGroup,
};
use crate::models::location::{LocationRecord, LocationStats, NewLocation};
use crate::models::user::{User, UserSettings};
use crate::services::viewport::BoundingBox;

/// Errors surfaced by store implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Backend(String),
}

/// Durable location history.
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Inserts a record and returns it with its assigned id.
    async fn insert(&self, location: NewLocation) -> Result<LocationRecord, StoreError>;

    /// Deletes one of the owner's records. Returns false if nothing matched.
    async fn delete(&self, owner_id: Uuid, id: i64) -> Result<bool, StoreError>;

    /// Deletes the owner's records among `ids`, returning how many were removed.
    async fn delete_many(&self, owner_id: Uuid, ids: &[i64]) -> Result<u64, StoreError>;

    /// Records captured within `range`, ascending by capture time then id.
    async fn find_in_range(
        &self,
        owner_id: Uuid,
        range: DateRange,
    ) -> Result<Vec<LocationRecord>, StoreError>;

    /// Totals and distinct non-empty place names within `range`.
    async fn stats_in_range(
        &self,
        owner_id: Uuid,
        range: DateRange,
    ) -> Result<LocationStats, StoreError>;

    async fn exists_in_range(&self, owner_id: Uuid, range: DateRange) -> Result<bool, StoreError>;

    /// Records of any of `owner_ids` inside `bbox` (inclusive), optionally
    /// limited to `range`, ascending by capture time then id.
    async fn find_in_viewport(
        &self,
        owner_ids: &[Uuid],
        bbox: &BoundingBox,
        range: Option<DateRange>,
    ) -> Result<Vec<LocationRecord>, StoreError>;

    /// The most recent record per owner; owners without data are omitted.
    async fn latest_for_owners(&self, owner_ids: &[Uuid])
        -> Result<Vec<LocationRecord>, StoreError>;

    /// Records captured at or after `since`, ascending.
    async fn find_since(
        &self,
        owner_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<LocationRecord>, StoreError>;
}

/// Groups, memberships and invitations.
///
/// Every mutating method is atomic: a membership row and its invitation
/// always change together.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Creates the group and its active owner membership.
    async fn create_group(&self, group: NewGroup) -> Result<Group, StoreError>;

    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StoreError>;

    /// Groups in which the user holds an active membership, with that membership.
    async fn groups_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(Group, GroupMembership)>, StoreError>;

    /// The user's open (pending or active) membership in the group.
    async fn open_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMembership>, StoreError>;

    /// Membership rows of a group; pending rows only when `include_pending`.
    async fn memberships(
        &self,
        group_id: Uuid,
        include_pending: bool,
    ) -> Result<Vec<GroupMembership>, StoreError>;

    /// Groups where both users are active members, with the subject's membership.
    async fn shared_groups(
        &self,
        viewer_id: Uuid,
        subject_id: Uuid,
    ) -> Result<Vec<(Group, GroupMembership)>, StoreError>;

    /// Creates a pending invitation and the matching pending membership.
    ///
    /// Fails with [`StoreError::Conflict`] if the invitee already has an
    /// open membership in the group.
    async fn create_invitation(
        &self,
        group_id: Uuid,
        invitee_id: Uuid,
        inviter_id: Uuid,
    ) -> Result<GroupInvitation, StoreError>;

    async fn find_invitation(
        &self,
        invitation_id: Uuid,
    ) -> Result<Option<GroupInvitation>, StoreError>;

    async fn pending_invitations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<GroupInvitation>, StoreError>;

    /// Moves a pending invitation to `status` and the pending membership to
    /// the matching membership status.
    async fn resolve_invitation(
        &self,
        invitation_id: Uuid,
        status: InvitationStatus,
        at: DateTime<Utc>,
    ) -> Result<GroupInvitation, StoreError>;

    /// Moves an active membership to Removed.
    async fn remove_member(&self, group_id: Uuid, user_id: Uuid) -> Result<(), StoreError>;

    async fn set_peer_visibility_disabled(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        disabled: bool,
    ) -> Result<GroupMembership, StoreError>;
}

/// Users and their settings.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Records the id/username pair from a verified token.
    async fn ensure_user(&self, user_id: Uuid, username: &str) -> Result<User, StoreError>;

    /// Settings for the user; defaults if none were stored.
    async fn settings(&self, user_id: Uuid) -> Result<UserSettings, StoreError>;

    async fn upsert_settings(
        &self,
        user_id: Uuid,
        settings: &UserSettings,
    ) -> Result<UserSettings, StoreError>;
}
