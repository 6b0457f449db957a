//! Group membership lifecycle.
//!
//! Every mutation commits through the [`MembershipStore`] before any realtime
//! event is published.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::group::{
    CreateGroupRequest, Group, GroupInvitation, GroupMembership, GroupRole, GroupSummary,
    InvitationStatus, InvitationView, ListMembersResponse, MemberView, MembershipStatus, NewGroup,
};
use crate::models::user::Caller;
use crate::services::clock::Clock;
use crate::services::fanout::{EventKind, FanOutHub, RealtimeEvent, Topic};
use crate::services::store::{MembershipStore, StoreError, UserDirectory};
use crate::services::visibility::{self, VisibilityPurpose};

/// Loads a group or fails with NotFound.
pub(crate) async fn load_group(
    store: &dyn MembershipStore,
    group_id: Uuid,
) -> Result<Group, DomainError> {
    store
        .find_group(group_id)
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("Group {} not found", group_id)))
}

/// Subjects of a group visible to `viewer` for `purpose`.
pub(crate) async fn subjects_in_group(
    store: &dyn MembershipStore,
    viewer: Uuid,
    group_id: Uuid,
    purpose: VisibilityPurpose,
) -> Result<Vec<Uuid>, DomainError> {
    let group = load_group(store, group_id).await?;
    let memberships = store.memberships(group_id, false).await?;
    visibility::visible_subjects(viewer, &group, &memberships, purpose)
}

/// Group, membership and invitation operations.
pub struct GroupService {
    memberships: Arc<dyn MembershipStore>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    hub: Arc<FanOutHub>,
}

impl GroupService {
    pub fn new(
        memberships: Arc<dyn MembershipStore>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
        hub: Arc<FanOutHub>,
    ) -> Self {
        Self {
            memberships,
            users,
            clock,
            hub,
        }
    }

    fn event(&self, kind: EventKind, topic: Topic) -> RealtimeEvent {
        RealtimeEvent::new(kind, topic, self.clock.now())
    }

    async fn active_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMembership>, DomainError> {
        Ok(self
            .memberships
            .open_membership(group_id, user_id)
            .await?
            .filter(|m| m.is_active()))
    }

    async fn require_owner(&self, group_id: Uuid, caller: &Caller) -> Result<(), DomainError> {
        match self.active_membership(group_id, caller.user_id).await? {
            Some(m) if m.role.can_manage_members() => Ok(()),
            _ => Err(DomainError::Forbidden(
                "Only the group owner can manage members".to_string(),
            )),
        }
    }

    async fn usernames(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, String>, DomainError> {
        let mut names = HashMap::with_capacity(user_ids.len());
        for id in user_ids {
            if let Some(user) = self.users.find_by_id(*id).await? {
                names.insert(*id, user.username);
            }
        }
        Ok(names)
    }

    pub async fn create_group(
        &self,
        caller: &Caller,
        request: CreateGroupRequest,
    ) -> Result<Group, DomainError> {
        let group = self
            .memberships
            .create_group(NewGroup {
                name: request.name,
                group_type: request.group_type,
                created_by: caller.user_id,
            })
            .await?;

        info!(
            group_id = %group.id,
            group_type = %group.group_type,
            owner_id = %caller.user_id,
            "Group created"
        );
        Ok(group)
    }

    /// Groups the caller actively belongs to.
    pub async fn list_groups(&self, caller: &Caller) -> Result<Vec<GroupSummary>, DomainError> {
        let groups = self.memberships.groups_for_user(caller.user_id).await?;
        Ok(groups
            .into_iter()
            .map(|(group, membership)| GroupSummary {
                id: group.id,
                name: group.name,
                group_type: group.group_type,
                role: membership.role,
                created_at: group.created_at,
            })
            .collect())
    }

    /// Member listing.
    ///
    /// Owners get the administrative view: every active and pending member
    /// with their peer-visibility flag. Other members get the map view,
    /// which omits peers hidden from them.
    pub async fn list_members(
        &self,
        caller: &Caller,
        group_id: Uuid,
    ) -> Result<ListMembersResponse, DomainError> {
        let group = load_group(self.memberships.as_ref(), group_id).await?;
        let active = self.memberships.memberships(group_id, false).await?;
        let is_owner = active
            .iter()
            .any(|m| m.user_id == caller.user_id && m.is_owner());

        let (administrative, rows) = if is_owner {
            visibility::visible_subjects(
                caller.user_id,
                &group,
                &active,
                VisibilityPurpose::Administrative,
            )?;
            (true, self.memberships.memberships(group_id, true).await?)
        } else {
            let visible = visibility::visible_subjects(
                caller.user_id,
                &group,
                &active,
                VisibilityPurpose::Map,
            )?;
            let rows = active
                .into_iter()
                .filter(|m| visible.contains(&m.user_id))
                .collect();
            (false, rows)
        };

        let ids: Vec<Uuid> = rows.iter().map(|m| m.user_id).collect();
        let names = self.usernames(&ids).await?;
        let members = rows
            .iter()
            .map(|m| {
                let name = names.get(&m.user_id).cloned().unwrap_or_default();
                MemberView::new(m, name)
            })
            .collect();

        Ok(ListMembersResponse {
            group_id,
            administrative,
            members,
        })
    }

    /// Subjects of a group visible to the caller.
    pub async fn visible_subjects(
        &self,
        caller: &Caller,
        group_id: Uuid,
        purpose: VisibilityPurpose,
    ) -> Result<Vec<Uuid>, DomainError> {
        subjects_in_group(self.memberships.as_ref(), caller.user_id, group_id, purpose).await
    }

    /// Invites a user by username. Owner only.
    pub async fn invite(
        &self,
        caller: &Caller,
        group_id: Uuid,
        username: &str,
    ) -> Result<GroupInvitation, DomainError> {
        load_group(self.memberships.as_ref(), group_id).await?;
        self.require_owner(group_id, caller).await?;

        let invitee = self
            .users
            .find_by_username(username)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("User {} not found", username)))?;

        match self.memberships.open_membership(group_id, invitee.id).await? {
            Some(m) if m.status == MembershipStatus::Active => {
                return Err(DomainError::AlreadyMember)
            }
            Some(_) => return Err(DomainError::DuplicateInvitation),
            None => {}
        }

        let invitation = self
            .memberships
            .create_invitation(group_id, invitee.id, caller.user_id)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => DomainError::DuplicateInvitation,
                other => DomainError::Store(other),
            })?;

        info!(
            group_id = %group_id,
            invitation_id = %invitation.id,
            invitee_id = %invitee.id,
            "Member invited"
        );

        self.hub.publish_all([
            self.event(EventKind::MemberInvited, Topic::Membership(invitee.id))
                .with_group(group_id),
            self.event(EventKind::MemberInvited, Topic::Group(group_id))
                .with_user(invitee.id),
        ]);

        Ok(invitation)
    }

    /// The caller's pending invitations.
    pub async fn pending_invitations(
        &self,
        caller: &Caller,
    ) -> Result<Vec<InvitationView>, DomainError> {
        let invitations = self
            .memberships
            .pending_invitations_for_user(caller.user_id)
            .await?;

        let mut views = Vec::with_capacity(invitations.len());
        for invitation in invitations {
            let Some(group) = self.memberships.find_group(invitation.group_id).await? else {
                continue;
            };
            views.push(InvitationView {
                id: invitation.id,
                group_id: group.id,
                group_name: group.name,
                inviter_id: invitation.inviter_id,
                status: invitation.status,
                created_at: invitation.created_at,
            });
        }
        Ok(views)
    }

    async fn load_pending_invitation(
        &self,
        invitation_id: Uuid,
    ) -> Result<GroupInvitation, DomainError> {
        let invitation = self
            .memberships
            .find_invitation(invitation_id)
            .await?
            .ok_or_else(|| {
                DomainError::NotFound(format!("Invitation {} not found", invitation_id))
            })?;

        if invitation.status != InvitationStatus::Pending {
            return Err(DomainError::Conflict(format!(
                "Invitation is already {}",
                invitation.status
            )));
        }
        Ok(invitation)
    }

    async fn respond(
        &self,
        caller: &Caller,
        invitation_id: Uuid,
        status: InvitationStatus,
    ) -> Result<GroupInvitation, DomainError> {
        let invitation = self.load_pending_invitation(invitation_id).await?;
        if invitation.invitee_id != caller.user_id {
            return Err(DomainError::Forbidden(
                "Only the invitee can respond to this invitation".to_string(),
            ));
        }

        let resolved = self
            .memberships
            .resolve_invitation(invitation_id, status, self.clock.now())
            .await
            .map_err(|e| match e {
                StoreError::Conflict(message) => DomainError::Conflict(message),
                other => DomainError::Store(other),
            })?;

        let kind = if status == InvitationStatus::Accepted {
            EventKind::MemberJoined
        } else {
            EventKind::MemberDeclined
        };

        info!(
            group_id = %resolved.group_id,
            invitation_id = %invitation_id,
            user_id = %caller.user_id,
            status = %status,
            "Invitation answered"
        );

        self.hub.publish_all([
            self.event(kind, Topic::Group(resolved.group_id))
                .with_user(caller.user_id),
            self.event(kind, Topic::Membership(caller.user_id))
                .with_group(resolved.group_id),
            self.event(kind, Topic::Membership(resolved.inviter_id))
                .with_group(resolved.group_id)
                .with_user(caller.user_id),
        ]);

        Ok(resolved)
    }

    pub async fn accept(
        &self,
        caller: &Caller,
        invitation_id: Uuid,
    ) -> Result<GroupInvitation, DomainError> {
        self.respond(caller, invitation_id, InvitationStatus::Accepted)
            .await
    }

    pub async fn decline(
        &self,
        caller: &Caller,
        invitation_id: Uuid,
    ) -> Result<GroupInvitation, DomainError> {
        self.respond(caller, invitation_id, InvitationStatus::Declined)
            .await
    }

    /// Revokes a pending invitation. Owner only.
    pub async fn revoke(
        &self,
        caller: &Caller,
        group_id: Uuid,
        invitation_id: Uuid,
    ) -> Result<GroupInvitation, DomainError> {
        load_group(self.memberships.as_ref(), group_id).await?;
        self.require_owner(group_id, caller).await?;

        let invitation = self.load_pending_invitation(invitation_id).await?;
        if invitation.group_id != group_id {
            return Err(DomainError::NotFound(format!(
                "Invitation {} not found",
                invitation_id
            )));
        }

        let revoked = self
            .memberships
            .resolve_invitation(invitation_id, InvitationStatus::Revoked, self.clock.now())
            .await
            .map_err(|e| match e {
                StoreError::Conflict(message) => DomainError::Conflict(message),
                other => DomainError::Store(other),
            })?;

        info!(
            group_id = %group_id,
            invitation_id = %invitation_id,
            "Invitation revoked"
        );

        self.hub.publish_all([
            self.event(EventKind::InvitationRevoked, Topic::Membership(revoked.invitee_id))
                .with_group(group_id),
            self.event(EventKind::InvitationRevoked, Topic::Group(group_id))
                .with_user(revoked.invitee_id),
        ]);

        Ok(revoked)
    }

    /// Removes a member (owner) or leaves the group (self).
    ///
    /// The owner cannot be removed, and cannot leave while they are the only owner.
    pub async fn remove_member(
        &self,
        caller: &Caller,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), DomainError> {
        load_group(self.memberships.as_ref(), group_id).await?;

        let target = self
            .active_membership(group_id, user_id)
            .await?
            .ok_or_else(|| {
                DomainError::NotFound(format!("User {} is not a member of this group", user_id))
            })?;

        if caller.user_id == user_id {
            if target.role == GroupRole::Owner {
                let owners = self
                    .memberships
                    .memberships(group_id, false)
                    .await?
                    .iter()
                    .filter(|m| m.is_owner())
                    .count();
                if owners <= 1 {
                    return Err(DomainError::Conflict(
                        "The only owner cannot leave the group".to_string(),
                    ));
                }
            }
        } else {
            self.require_owner(group_id, caller).await?;
            if target.role == GroupRole::Owner {
                return Err(DomainError::Forbidden(
                    "The group owner cannot be removed".to_string(),
                ));
            }
        }

        self.memberships.remove_member(group_id, user_id).await?;

        info!(
            group_id = %group_id,
            user_id = %user_id,
            removed_by = %caller.user_id,
            "Member removed"
        );

        self.hub.publish_all([
            self.event(EventKind::MemberRemoved, Topic::Group(group_id))
                .with_user(user_id),
            self.event(EventKind::MemberRemoved, Topic::Membership(user_id))
                .with_group(group_id),
        ]);

        Ok(())
    }

    /// Sets the member's own peer-visibility opt-out.
    ///
    /// The flag is stored for any group type but only takes effect in
    /// organization groups.
    pub async fn set_peer_visibility(
        &self,
        caller: &Caller,
        group_id: Uuid,
        user_id: Uuid,
        disabled: bool,
    ) -> Result<MemberView, DomainError> {
        load_group(self.memberships.as_ref(), group_id).await?;

        if caller.user_id != user_id {
            return Err(DomainError::Forbidden(
                "Members can only change their own peer visibility".to_string(),
            ));
        }
        if self.active_membership(group_id, user_id).await?.is_none() {
            return Err(DomainError::Forbidden(
                "Not a member of this group".to_string(),
            ));
        }

        let membership = self
            .memberships
            .set_peer_visibility_disabled(group_id, user_id, disabled)
            .await?;

        info!(
            group_id = %group_id,
            user_id = %user_id,
            disabled,
            "Peer visibility updated"
        );

        self.hub.publish(
            self.event(EventKind::PeerVisibilityChanged, Topic::Group(group_id))
                .with_user(user_id),
        );

        Ok(MemberView::new(&membership, caller.username.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::group::GroupType;
    use crate::services::clock::FixedClock;
    use crate::services::memory::InMemoryStore;
    use chrono::{TimeZone, Utc};

    struct Fixture {
        service: GroupService,
        hub: Arc<FanOutHub>,
        owner: Caller,
        bob: Caller,
        carol: Caller,
    }

    async fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        let hub = Arc::new(FanOutHub::default());

        let owner = Caller::new(Uuid::new_v4(), "alice");
        let bob = Caller::new(Uuid::new_v4(), "bob");
        let carol = Caller::new(Uuid::new_v4(), "carol");
        for caller in [&owner, &bob, &carol] {
            store
                .ensure_user(caller.user_id, &caller.username)
                .await
                .unwrap();
        }

        Fixture {
            service: GroupService::new(store.clone(), store, clock, hub.clone()),
            hub,
            owner,
            bob,
            carol,
        }
    }

    async fn org_with_members(f: &Fixture) -> Group {
        let group = f
            .service
            .create_group(
                &f.owner,
                CreateGroupRequest {
                    name: "Field team".to_string(),
                    group_type: GroupType::Organization,
                },
            )
            .await
            .unwrap();

        for member in [&f.bob, &f.carol] {
            let invitation = f
                .service
                .invite(&f.owner, group.id, &member.username)
                .await
                .unwrap();
            f.service.accept(member, invitation.id).await.unwrap();
        }
        group
    }

    #[tokio::test]
    async fn test_invite_accept_and_opt_out_listing() {
        let f = fixture().await;
        let group = org_with_members(&f).await;

        f.service
            .set_peer_visibility(&f.bob, group.id, f.bob.user_id, true)
            .await
            .unwrap();

        let admin = f.service.list_members(&f.owner, group.id).await.unwrap();
        assert!(admin.administrative);
        let bob_row = admin
            .members
            .iter()
            .find(|m| m.user_id == f.bob.user_id)
            .unwrap();
        assert!(bob_row.peer_visibility_access_disabled);
        assert_eq!(bob_row.username, "bob");

        let peer = f.service.list_members(&f.carol, group.id).await.unwrap();
        assert!(!peer.administrative);
        assert!(peer.members.iter().all(|m| m.user_id != f.bob.user_id));
        assert!(peer.members.iter().any(|m| m.user_id == f.carol.user_id));

        let own = f.service.list_members(&f.bob, group.id).await.unwrap();
        assert!(own.members.iter().any(|m| m.user_id == f.bob.user_id));
    }

    #[tokio::test]
    async fn test_duplicate_and_existing_member_invites() {
        let f = fixture().await;
        let group = org_with_members(&f).await;

        assert!(matches!(
            f.service.invite(&f.owner, group.id, "bob").await,
            Err(DomainError::AlreadyMember)
        ));

        f.service.remove_member(&f.owner, group.id, f.carol.user_id).await.unwrap();
        f.service.invite(&f.owner, group.id, "carol").await.unwrap();
        assert!(matches!(
            f.service.invite(&f.owner, group.id, "carol").await,
            Err(DomainError::DuplicateInvitation)
        ));
    }

    #[tokio::test]
    async fn test_only_owner_manages_members() {
        let f = fixture().await;
        let group = org_with_members(&f).await;

        assert!(matches!(
            f.service.invite(&f.bob, group.id, "carol").await,
            Err(DomainError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.remove_member(&f.bob, group.id, f.carol.user_id).await,
            Err(DomainError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.remove_member(&f.owner, group.id, f.owner.user_id).await,
            Err(DomainError::Conflict(_))
        ));
        assert!(matches!(
            f.service.list_members(&Caller::new(Uuid::new_v4(), "eve"), group.id).await,
            Err(DomainError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_peer_visibility_is_self_only() {
        let f = fixture().await;
        let group = org_with_members(&f).await;

        assert!(matches!(
            f.service
                .set_peer_visibility(&f.owner, group.id, f.bob.user_id, true)
                .await,
            Err(DomainError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_decline_and_revoke() {
        let f = fixture().await;
        let group = f
            .service
            .create_group(
                &f.owner,
                CreateGroupRequest {
                    name: "Family".to_string(),
                    group_type: GroupType::Family,
                },
            )
            .await
            .unwrap();

        let invitation = f.service.invite(&f.owner, group.id, "bob").await.unwrap();
        assert!(matches!(
            f.service.accept(&f.carol, invitation.id).await,
            Err(DomainError::Forbidden(_))
        ));
        let declined = f.service.decline(&f.bob, invitation.id).await.unwrap();
        assert_eq!(declined.status, InvitationStatus::Declined);
        assert!(matches!(
            f.service.accept(&f.bob, invitation.id).await,
            Err(DomainError::Conflict(_))
        ));

        let second = f.service.invite(&f.owner, group.id, "bob").await.unwrap();
        assert_eq!(f.service.pending_invitations(&f.bob).await.unwrap().len(), 1);
        let revoked = f.service.revoke(&f.owner, group.id, second.id).await.unwrap();
        assert_eq!(revoked.status, InvitationStatus::Revoked);
        assert!(f.service.pending_invitations(&f.bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_membership_events_follow_commit() {
        let f = fixture().await;
        let mut bob_events = f.hub.subscribe(Topic::Membership(f.bob.user_id));
        let group = f
            .service
            .create_group(
                &f.owner,
                CreateGroupRequest {
                    name: "Friends".to_string(),
                    group_type: GroupType::Friends,
                },
            )
            .await
            .unwrap();

        f.service.invite(&f.owner, group.id, "bob").await.unwrap();
        let event = bob_events.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::MemberInvited);
        assert_eq!(event.group_id, Some(group.id));
    }

    #[tokio::test]
    async fn test_unknown_group_is_not_found() {
        let f = fixture().await;
        assert!(matches!(
            f.service.invite(&f.owner, Uuid::new_v4(), "bob").await,
            Err(DomainError::NotFound(_))
        ));
    }
}
