//! Group, membership and invitation entities (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::group::{
    Group, GroupInvitation, GroupMembership, GroupRole, GroupType, InvitationStatus,
    MembershipStatus,
};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for group_type that maps to PostgreSQL enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "group_type", rename_all = "lowercase")]
pub enum GroupTypeDb {
    Family,
    Friends,
    Organization,
}

impl From<GroupTypeDb> for GroupType {
    fn from(db: GroupTypeDb) -> Self {
        match db {
            GroupTypeDb::Family => GroupType::Family,
            GroupTypeDb::Friends => GroupType::Friends,
            GroupTypeDb::Organization => GroupType::Organization,
        }
    }
}

impl From<GroupType> for GroupTypeDb {
    fn from(group_type: GroupType) -> Self {
        match group_type {
            GroupType::Family => GroupTypeDb::Family,
            GroupType::Friends => GroupTypeDb::Friends,
            GroupType::Organization => GroupTypeDb::Organization,
        }
    }
}

/// Database enum for group_role that maps to PostgreSQL enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "group_role", rename_all = "lowercase")]
pub enum GroupRoleDb {
    Owner,
    Member,
}

impl From<GroupRoleDb> for GroupRole {
    fn from(db_role: GroupRoleDb) -> Self {
        match db_role {
            GroupRoleDb::Owner => GroupRole::Owner,
            GroupRoleDb::Member => GroupRole::Member,
        }
    }
}

impl From<GroupRole> for GroupRoleDb {
    fn from(role: GroupRole) -> Self {
        match role {
            GroupRole::Owner => GroupRoleDb::Owner,
            GroupRole::Member => GroupRoleDb::Member,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "membership_status", rename_all = "lowercase")]
pub enum MembershipStatusDb {
    Pending,
    Active,
    Removed,
    Revoked,
}

impl From<MembershipStatusDb> for MembershipStatus {
    fn from(db: MembershipStatusDb) -> Self {
        match db {
            MembershipStatusDb::Pending => MembershipStatus::Pending,
            MembershipStatusDb::Active => MembershipStatus::Active,
            MembershipStatusDb::Removed => MembershipStatus::Removed,
            MembershipStatusDb::Revoked => MembershipStatus::Revoked,
        }
    }
}

impl From<MembershipStatus> for MembershipStatusDb {
    fn from(status: MembershipStatus) -> Self {
        match status {
            MembershipStatus::Pending => MembershipStatusDb::Pending,
            MembershipStatus::Active => MembershipStatusDb::Active,
            MembershipStatus::Removed => MembershipStatusDb::Removed,
            MembershipStatus::Revoked => MembershipStatusDb::Revoked,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "invitation_status", rename_all = "lowercase")]
pub enum InvitationStatusDb {
    Pending,
    Accepted,
    Declined,
    Revoked,
}

impl From<InvitationStatusDb> for InvitationStatus {
    fn from(db: InvitationStatusDb) -> Self {
        match db {
            InvitationStatusDb::Pending => InvitationStatus::Pending,
            InvitationStatusDb::Accepted => InvitationStatus::Accepted,
            InvitationStatusDb::Declined => InvitationStatus::Declined,
            InvitationStatusDb::Revoked => InvitationStatus::Revoked,
        }
    }
}

impl From<InvitationStatus> for InvitationStatusDb {
    fn from(status: InvitationStatus) -> Self {
        match status {
            InvitationStatus::Pending => InvitationStatusDb::Pending,
            InvitationStatus::Accepted => InvitationStatusDb::Accepted,
            InvitationStatus::Declined => InvitationStatusDb::Declined,
            InvitationStatus::Revoked => InvitationStatusDb::Revoked,
        }
    }
}

/// Database row mapping for the groups table.
#[derive(Debug, Clone, FromRow)]
pub struct GroupEntity {
    pub id: Uuid,
    pub name: String,
    pub group_type: GroupTypeDb,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<GroupEntity> for Group {
    fn from(entity: GroupEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            group_type: entity.group_type.into(),
            created_by: entity.created_by,
            created_at: entity.created_at,
        }
    }
}

/// Database row mapping for the group_memberships table.
#[derive(Debug, Clone, FromRow)]
pub struct GroupMembershipEntity {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub role: GroupRoleDb,
    pub status: MembershipStatusDb,
    pub peer_visibility_access_disabled: bool,
    pub invited_by: Option<Uuid>,
    pub joined_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<GroupMembershipEntity> for GroupMembership {
    fn from(entity: GroupMembershipEntity) -> Self {
        Self {
            id: entity.id,
            group_id: entity.group_id,
            user_id: entity.user_id,
            role: entity.role.into(),
            status: entity.status.into(),
            peer_visibility_access_disabled: entity.peer_visibility_access_disabled,
            invited_by: entity.invited_by,
            joined_at: entity.joined_at,
            updated_at: entity.updated_at,
        }
    }
}

/// A group joined with one membership row of that group.
#[derive(Debug, Clone, FromRow)]
pub struct GroupWithMembershipEntity {
    pub id: Uuid,
    pub name: String,
    pub group_type: GroupTypeDb,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub membership_id: Uuid,
    pub user_id: Uuid,
    pub role: GroupRoleDb,
    pub status: MembershipStatusDb,
    pub peer_visibility_access_disabled: bool,
    pub invited_by: Option<Uuid>,
    pub joined_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<GroupWithMembershipEntity> for (Group, GroupMembership) {
    fn from(entity: GroupWithMembershipEntity) -> Self {
        let membership = GroupMembership {
            id: entity.membership_id,
            group_id: entity.id,
            user_id: entity.user_id,
            role: entity.role.into(),
            status: entity.status.into(),
            peer_visibility_access_disabled: entity.peer_visibility_access_disabled,
            invited_by: entity.invited_by,
            joined_at: entity.joined_at,
            updated_at: entity.updated_at,
        };
        let group = Group {
            id: entity.id,
            name: entity.name,
            group_type: entity.group_type.into(),
            created_by: entity.created_by,
            created_at: entity.created_at,
        };
        (group, membership)
    }
}

/// Database row mapping for the group_invitations table.
#[derive(Debug, Clone, FromRow)]
pub struct GroupInvitationEntity {
    pub id: Uuid,
    pub group_id: Uuid,
    pub invitee_id: Uuid,
    pub inviter_id: Uuid,
    pub status: InvitationStatusDb,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl From<GroupInvitationEntity> for GroupInvitation {
    fn from(entity: GroupInvitationEntity) -> Self {
        Self {
            id: entity.id,
            group_id: entity.group_id,
            invitee_id: entity.invitee_id,
            inviter_id: entity.inviter_id,
            status: entity.status.into(),
            created_at: entity.created_at,
            responded_at: entity.responded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_round_trip_through_db_types() {
        for status in [
            InvitationStatus::Pending,
            InvitationStatus::Accepted,
            InvitationStatus::Declined,
            InvitationStatus::Revoked,
        ] {
            assert_eq!(InvitationStatus::from(InvitationStatusDb::from(status)), status);
        }
        assert_eq!(
            GroupType::from(GroupTypeDb::from(GroupType::Organization)),
            GroupType::Organization
        );
    }

    #[test]
    fn test_joined_row_splits_into_group_and_membership() {
        let now = Utc::now();
        let row = GroupWithMembershipEntity {
            id: Uuid::new_v4(),
            name: "Ops".to_string(),
            group_type: GroupTypeDb::Organization,
            created_by: Uuid::new_v4(),
            created_at: now,
            membership_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: GroupRoleDb::Member,
            status: MembershipStatusDb::Active,
            peer_visibility_access_disabled: true,
            invited_by: None,
            joined_at: Some(now),
            updated_at: now,
        };

        let (group, membership) = <(Group, GroupMembership)>::from(row.clone());
        assert_eq!(membership.group_id, group.id);
        assert_eq!(membership.id, row.membership_id);
        assert!(membership.is_active());
        assert!(group.group_type.honours_peer_opt_out());
    }
}
