//! Group domain models for map-sharing groups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Kind of group; decides whether members may hide from peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    Family,
    Friends,
    Organization,
}

impl GroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupType::Family => "family",
            GroupType::Friends => "friends",
            GroupType::Organization => "organization",
        }
    }

    /// Returns true if a member's peer-visibility opt-out is honoured here.
    pub fn honours_peer_opt_out(&self) -> bool {
        matches!(self, GroupType::Organization)
    }
}

impl FromStr for GroupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "family" => Ok(GroupType::Family),
            "friends" => Ok(GroupType::Friends),
            "organization" => Ok(GroupType::Organization),
            _ => Err(format!("Invalid group type: {}", s)),
        }
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Owner,
    Member,
}

impl GroupRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::Owner => "owner",
            GroupRole::Member => "member",
        }
    }

    /// Returns true if this role can invite, revoke and remove members
    pub fn can_manage_members(&self) -> bool {
        matches!(self, GroupRole::Owner)
    }

    /// Returns true if this role sees the administrative member listing
    pub fn can_view_administrative(&self) -> bool {
        matches!(self, GroupRole::Owner)
    }
}

impl FromStr for GroupRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(GroupRole::Owner),
            "member" => Ok(GroupRole::Member),
            _ => Err(format!("Invalid group role: {}", s)),
        }
    }
}

impl fmt::Display for GroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a membership row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Pending,
    Active,
    Removed,
    Revoked,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Pending => "pending",
            MembershipStatus::Active => "active",
            MembershipStatus::Removed => "removed",
            MembershipStatus::Revoked => "revoked",
        }
    }

    /// Pending and Active rows occupy the (group, user) slot.
    pub fn is_open(&self) -> bool {
        matches!(self, MembershipStatus::Pending | MembershipStatus::Active)
    }
}

impl FromStr for MembershipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(MembershipStatus::Pending),
            "active" => Ok(MembershipStatus::Active),
            "removed" => Ok(MembershipStatus::Removed),
            "revoked" => Ok(MembershipStatus::Revoked),
            _ => Err(format!("Invalid membership status: {}", s)),
        }
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
    Revoked,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Declined => "declined",
            InvitationStatus::Revoked => "revoked",
        }
    }

    /// Membership status the invitee's row moves to when the invitation resolves.
    pub fn membership_status(&self) -> MembershipStatus {
        match self {
            InvitationStatus::Pending => MembershipStatus::Pending,
            InvitationStatus::Accepted => MembershipStatus::Active,
            InvitationStatus::Declined => MembershipStatus::Removed,
            InvitationStatus::Revoked => MembershipStatus::Revoked,
        }
    }
}

impl FromStr for InvitationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "declined" => Ok(InvitationStatus::Declined),
            "revoked" => Ok(InvitationStatus::Revoked),
            _ => Err(format!("Invalid invitation status: {}", s)),
        }
    }
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A map-sharing group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub group_type: GroupType,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A user's membership row in a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMembership {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub role: GroupRole,
    pub status: MembershipStatus,
    pub peer_visibility_access_disabled: bool,
    pub invited_by: Option<Uuid>,
    pub joined_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl GroupMembership {
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }

    pub fn is_owner(&self) -> bool {
        self.is_active() && self.role == GroupRole::Owner
    }
}

/// An invitation to join a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInvitation {
    pub id: Uuid,
    pub group_id: Uuid,
    pub invitee_id: Uuid,
    pub inviter_id: Uuid,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

/// Input for creating a group; the creator becomes its active owner.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGroup {
    pub name: String,
    pub group_type: GroupType,
    pub created_by: Uuid,
}

/// Request payload for creating a group.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must be between 1 and 100 characters"
    ))]
    pub name: String,

    pub group_type: GroupType,
}

/// Request payload for inviting a user by username.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvitationRequest {
    #[validate(custom(function = "shared::validation::validate_username"))]
    pub username: String,
}

/// Request payload for toggling a member's org peer-visibility opt-out.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerVisibilityRequest {
    pub disabled: bool,
}

/// A group as listed for one of its members.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: Uuid,
    pub name: String,
    pub group_type: GroupType,
    pub role: GroupRole,
    pub created_at: DateTime<Utc>,
}

/// A member row as returned by member listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub user_id: Uuid,
    pub username: String,
    pub role: GroupRole,
    pub status: MembershipStatus,
    pub peer_visibility_access_disabled: bool,
    pub joined_at: Option<DateTime<Utc>>,
}

impl MemberView {
    pub fn new(membership: &GroupMembership, username: impl Into<String>) -> Self {
        Self {
            user_id: membership.user_id,
            username: username.into(),
            role: membership.role,
            status: membership.status,
            peer_visibility_access_disabled: membership.peer_visibility_access_disabled,
            joined_at: membership.joined_at,
        }
    }
}

/// Response for a member listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMembersResponse {
    pub group_id: Uuid,
    pub administrative: bool,
    pub members: Vec<MemberView>,
}

/// A pending invitation as shown to its invitee.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationView {
    pub id: Uuid,
    pub group_id: Uuid,
    pub group_name: String,
    pub inviter_id: Uuid,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
}
