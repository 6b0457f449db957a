//! Group, membership and invitation repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::group::{
    Group, GroupInvitation, GroupMembership, InvitationStatus, NewGroup,
};
use domain::services::{MembershipStore, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

use super::store_error;
use crate::entities::{
    GroupEntity, GroupInvitationEntity, GroupMembershipEntity, GroupRoleDb, GroupTypeDb,
    GroupWithMembershipEntity, InvitationStatusDb, MembershipStatusDb,
};
use crate::metrics::QueryTimer;

const MEMBERSHIP_COLUMNS: &str = "id, group_id, user_id, role, status, \
     peer_visibility_access_disabled, invited_by, joined_at, updated_at";

const INVITATION_COLUMNS: &str =
    "id, group_id, invitee_id, inviter_id, status, created_at, responded_at";

/// Columns for [`GroupWithMembershipEntity`], with `g` and `gm` aliases.
const GROUP_WITH_MEMBERSHIP_COLUMNS: &str = "g.id, g.name, g.group_type, g.created_by, \
     g.created_at, gm.id AS membership_id, gm.user_id, gm.role, gm.status, \
     gm.peer_visibility_access_disabled, gm.invited_by, gm.joined_at, gm.updated_at";

/// Repository for group-related database operations.
#[derive(Clone)]
pub struct MembershipRepository {
    pool: PgPool,
}

impl MembershipRepository {
    /// Creates a new MembershipRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipStore for MembershipRepository {
    async fn create_group(&self, new_group: NewGroup) -> Result<Group, StoreError> {
        let timer = QueryTimer::new("create_group");

        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let group = sqlx::query_as::<_, GroupEntity>(
            r#"
            INSERT INTO groups (name, group_type, created_by)
            VALUES ($1, $2, $3)
            RETURNING id, name, group_type, created_by, created_at
            "#,
        )
        .bind(&new_group.name)
        .bind(GroupTypeDb::from(new_group.group_type))
        .bind(new_group.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_error)?;

        sqlx::query(
            r#"
            INSERT INTO group_memberships (group_id, user_id, role, status, joined_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(group.id)
        .bind(new_group.created_by)
        .bind(GroupRoleDb::Owner)
        .bind(MembershipStatusDb::Active)
        .bind(group.created_at)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        timer.record();
        Ok(group.into())
    }

    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StoreError> {
        let timer = QueryTimer::new("find_group_by_id");
        let result = sqlx::query_as::<_, GroupEntity>(
            "SELECT id, name, group_type, created_by, created_at FROM groups WHERE id = $1",
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(store_error)?.map(Into::into))
    }

    async fn groups_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(Group, GroupMembership)>, StoreError> {
        let timer = QueryTimer::new("find_user_groups");
        let result = sqlx::query_as::<_, GroupWithMembershipEntity>(&format!(
            r#"
            SELECT {}
            FROM groups g
            JOIN group_memberships gm ON gm.group_id = g.id
            WHERE gm.user_id = $1 AND gm.status = 'active'
            ORDER BY g.created_at ASC, g.id ASC
            "#,
            GROUP_WITH_MEMBERSHIP_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        Ok(result
            .map_err(store_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn open_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMembership>, StoreError> {
        let timer = QueryTimer::new("find_open_membership");
        let result = sqlx::query_as::<_, GroupMembershipEntity>(&format!(
            r#"
            SELECT {}
            FROM group_memberships
            WHERE group_id = $1 AND user_id = $2 AND status IN ('pending', 'active')
            "#,
            MEMBERSHIP_COLUMNS
        ))
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(store_error)?.map(Into::into))
    }

    async fn memberships(
        &self,
        group_id: Uuid,
        include_pending: bool,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        let timer = QueryTimer::new("list_group_memberships");
        let result = sqlx::query_as::<_, GroupMembershipEntity>(&format!(
            r#"
            SELECT {}
            FROM group_memberships
            WHERE group_id = $1
              AND (status = 'active' OR ($2 AND status = 'pending'))
            ORDER BY role ASC, joined_at ASC NULLS LAST, updated_at ASC
            "#,
            MEMBERSHIP_COLUMNS
        ))
        .bind(group_id)
        .bind(include_pending)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        Ok(result
            .map_err(store_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn shared_groups(
        &self,
        viewer_id: Uuid,
        subject_id: Uuid,
    ) -> Result<Vec<(Group, GroupMembership)>, StoreError> {
        let timer = QueryTimer::new("find_shared_groups");
        let result = sqlx::query_as::<_, GroupWithMembershipEntity>(&format!(
            r#"
            SELECT {}
            FROM groups g
            JOIN group_memberships gm ON gm.group_id = g.id
            JOIN group_memberships vm ON vm.group_id = g.id
            WHERE gm.user_id = $2 AND gm.status = 'active'
              AND vm.user_id = $1 AND vm.status = 'active'
            ORDER BY g.created_at ASC, g.id ASC
            "#,
            GROUP_WITH_MEMBERSHIP_COLUMNS
        ))
        .bind(viewer_id)
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        Ok(result
            .map_err(store_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn create_invitation(
        &self,
        group_id: Uuid,
        invitee_id: Uuid,
        inviter_id: Uuid,
    ) -> Result<GroupInvitation, StoreError> {
        let timer = QueryTimer::new("create_group_invitation");

        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM groups WHERE id = $1)")
            .bind(group_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(store_error)?;
        if !exists {
            return Err(StoreError::NotFound(format!("group {}", group_id)));
        }

        // The partial unique index rejects a second open membership.
        sqlx::query(
            r#"
            INSERT INTO group_memberships (group_id, user_id, role, status, invited_by)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(group_id)
        .bind(invitee_id)
        .bind(GroupRoleDb::Member)
        .bind(MembershipStatusDb::Pending)
        .bind(inviter_id)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        let invitation = sqlx::query_as::<_, GroupInvitationEntity>(&format!(
            r#"
            INSERT INTO group_invitations (group_id, invitee_id, inviter_id, status)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            INVITATION_COLUMNS
        ))
        .bind(group_id)
        .bind(invitee_id)
        .bind(inviter_id)
        .bind(InvitationStatusDb::Pending)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        timer.record();
        Ok(invitation.into())
    }

    async fn find_invitation(
        &self,
        invitation_id: Uuid,
    ) -> Result<Option<GroupInvitation>, StoreError> {
        let timer = QueryTimer::new("find_group_invitation");
        let result = sqlx::query_as::<_, GroupInvitationEntity>(&format!(
            "SELECT {} FROM group_invitations WHERE id = $1",
            INVITATION_COLUMNS
        ))
        .bind(invitation_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(store_error)?.map(Into::into))
    }

    async fn pending_invitations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<GroupInvitation>, StoreError> {
        let timer = QueryTimer::new("list_pending_invitations");
        let result = sqlx::query_as::<_, GroupInvitationEntity>(&format!(
            r#"
            SELECT {}
            FROM group_invitations
            WHERE invitee_id = $1 AND status = 'pending'
            ORDER BY created_at ASC
            "#,
            INVITATION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        Ok(result
            .map_err(store_error)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn resolve_invitation(
        &self,
        invitation_id: Uuid,
        status: InvitationStatus,
        at: DateTime<Utc>,
    ) -> Result<GroupInvitation, StoreError> {
        let timer = QueryTimer::new("resolve_group_invitation");

        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let current = sqlx::query_as::<_, GroupInvitationEntity>(&format!(
            "SELECT {} FROM group_invitations WHERE id = $1 FOR UPDATE",
            INVITATION_COLUMNS
        ))
        .bind(invitation_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?
        .ok_or_else(|| StoreError::NotFound(format!("invitation {}", invitation_id)))?;

        if current.status != InvitationStatusDb::Pending {
            return Err(StoreError::Conflict(format!(
                "invitation is already {}",
                InvitationStatus::from(current.status)
            )));
        }

        let resolved = sqlx::query_as::<_, GroupInvitationEntity>(&format!(
            r#"
            UPDATE group_invitations
            SET status = $2, responded_at = $3
            WHERE id = $1
            RETURNING {}
            "#,
            INVITATION_COLUMNS
        ))
        .bind(invitation_id)
        .bind(InvitationStatusDb::from(status))
        .bind(at)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_error)?;

        sqlx::query(
            r#"
            UPDATE group_memberships
            SET status = $3,
                updated_at = $4,
                joined_at = CASE WHEN $3 = 'active'::membership_status THEN $4 ELSE joined_at END
            WHERE group_id = $1 AND user_id = $2 AND status = 'pending'
            "#,
        )
        .bind(resolved.group_id)
        .bind(resolved.invitee_id)
        .bind(MembershipStatusDb::from(status.membership_status()))
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        timer.record();
        Ok(resolved.into())
    }

    async fn remove_member(&self, group_id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        let timer = QueryTimer::new("remove_group_member");
        let result = sqlx::query(
            r#"
            UPDATE group_memberships
            SET status = 'removed', updated_at = NOW()
            WHERE group_id = $1 AND user_id = $2 AND status = 'active'
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&self.pool)
        .await;
        timer.record();

        if result.map_err(store_error)?.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "active member {} in {}",
                user_id, group_id
            )));
        }
        Ok(())
    }

    async fn set_peer_visibility_disabled(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        disabled: bool,
    ) -> Result<GroupMembership, StoreError> {
        let timer = QueryTimer::new("set_peer_visibility_disabled");
        let result = sqlx::query_as::<_, GroupMembershipEntity>(&format!(
            r#"
            UPDATE group_memberships
            SET peer_visibility_access_disabled = $3, updated_at = NOW()
            WHERE group_id = $1 AND user_id = $2 AND status = 'active'
            RETURNING {}
            "#,
            MEMBERSHIP_COLUMNS
        ))
        .bind(group_id)
        .bind(user_id)
        .bind(disabled)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result
            .map_err(store_error)?
            .map(Into::into)
            .ok_or_else(|| {
                StoreError::NotFound(format!("active member {} in {}", user_id, group_id))
            })
    }
}
