//! In-memory implementation of the store traits.
//!
//! Backs `storage.backend = "memory"` and the test suites. All state sits
//! behind one lock, so every method is atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::chronology::DateRange;
use crate::models::group::{
    Group, GroupInvitation, GroupMembership, GroupRole, InvitationStatus, MembershipStatus,
    NewGroup,
};
use crate::models::location::{LocationRecord, LocationStats, NewLocation};
use crate::models::user::{User, UserSettings};
use crate::services::clock::{Clock, SystemClock};
use crate::services::liveness::latest_of;
use crate::services::store::{LocationStore, MembershipStore, StoreError, UserDirectory};
use crate::services::viewport::BoundingBox;

#[derive(Debug, Default)]
struct State {
    last_location_id: i64,
    locations: Vec<LocationRecord>,
    users: HashMap<Uuid, User>,
    settings: HashMap<Uuid, UserSettings>,
    groups: HashMap<Uuid, Group>,
    memberships: Vec<GroupMembership>,
    invitations: Vec<GroupInvitation>,
}

impl State {
    fn group(&self, group_id: Uuid) -> Result<&Group, StoreError> {
        self.groups
            .get(&group_id)
            .ok_or_else(|| StoreError::NotFound(format!("group {}", group_id)))
    }

    fn active_membership(&self, group_id: Uuid, user_id: Uuid) -> Option<&GroupMembership> {
        self.memberships
            .iter()
            .find(|m| m.group_id == group_id && m.user_id == user_id && m.is_active())
    }

    fn active_membership_mut(
        &mut self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<&mut GroupMembership, StoreError> {
        self.memberships
            .iter_mut()
            .find(|m| m.group_id == group_id && m.user_id == user_id && m.is_active())
            .ok_or_else(|| StoreError::NotFound(format!("active member {} in {}", user_id, group_id)))
    }
}

fn chronological(mut records: Vec<LocationRecord>) -> Vec<LocationRecord> {
    records.sort_by_key(|r| (r.captured_at, r.id));
    records
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Store that keeps everything in process memory.
pub struct InMemoryStore {
    state: RwLock<State>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryStore {
    /// Creates an empty store stamping rows with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(State::default()),
            clock,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[async_trait]
impl LocationStore for InMemoryStore {
    async fn insert(&self, location: NewLocation) -> Result<LocationRecord, StoreError> {
        let mut state = self.state.write().await;
        state.last_location_id += 1;
        let record = location.into_record(state.last_location_id);
        state.locations.push(record.clone());
        Ok(record)
    }

    async fn delete(&self, owner_id: Uuid, id: i64) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let before = state.locations.len();
        state
            .locations
            .retain(|r| !(r.id == id && r.owner_id == owner_id));
        Ok(state.locations.len() < before)
    }

    async fn delete_many(&self, owner_id: Uuid, ids: &[i64]) -> Result<u64, StoreError> {
        let ids: HashSet<i64> = ids.iter().copied().collect();
        let mut state = self.state.write().await;
        let before = state.locations.len();
        state
            .locations
            .retain(|r| !(r.owner_id == owner_id && ids.contains(&r.id)));
        Ok((before - state.locations.len()) as u64)
    }

    async fn find_in_range(
        &self,
        owner_id: Uuid,
        range: DateRange,
    ) -> Result<Vec<LocationRecord>, StoreError> {
        let state = self.state.read().await;
        let records = state
            .locations
            .iter()
            .filter(|r| r.owner_id == owner_id && range.contains(r.captured_at))
            .cloned()
            .collect();
        Ok(chronological(records))
    }

    async fn stats_in_range(
        &self,
        owner_id: Uuid,
        range: DateRange,
    ) -> Result<LocationStats, StoreError> {
        let state = self.state.read().await;
        let mut countries = HashSet::new();
        let mut regions = HashSet::new();
        let mut cities = HashSet::new();
        let mut total = 0i64;

        for record in state
            .locations
            .iter()
            .filter(|r| r.owner_id == owner_id && range.contains(r.captured_at))
        {
            total += 1;
            countries.extend(non_empty(&record.country));
            regions.extend(non_empty(&record.region));
            cities.extend(non_empty(&record.city));
        }

        Ok(LocationStats {
            total_locations: total,
            countries_visited: countries.len() as i64,
            regions_visited: regions.len() as i64,
            cities_visited: cities.len() as i64,
        })
    }

    async fn exists_in_range(&self, owner_id: Uuid, range: DateRange) -> Result<bool, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .locations
            .iter()
            .any(|r| r.owner_id == owner_id && range.contains(r.captured_at)))
    }

    async fn find_in_viewport(
        &self,
        owner_ids: &[Uuid],
        bbox: &BoundingBox,
        range: Option<DateRange>,
    ) -> Result<Vec<LocationRecord>, StoreError> {
        let state = self.state.read().await;
        let records = state
            .locations
            .iter()
            .filter(|r| owner_ids.contains(&r.owner_id))
            .filter(|r| bbox.contains_record(r))
            .filter(|r| range.map_or(true, |range| range.contains(r.captured_at)))
            .cloned()
            .collect();
        Ok(chronological(records))
    }

    async fn latest_for_owners(
        &self,
        owner_ids: &[Uuid],
    ) -> Result<Vec<LocationRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(owner_ids
            .iter()
            .filter_map(|owner| latest_of(state.locations.iter().filter(|r| r.owner_id == *owner)))
            .cloned()
            .collect())
    }

    async fn find_since(
        &self,
        owner_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<LocationRecord>, StoreError> {
        let state = self.state.read().await;
        let records = state
            .locations
            .iter()
            .filter(|r| r.owner_id == owner_id && r.captured_at >= since)
            .cloned()
            .collect();
        Ok(chronological(records))
    }
}

#[async_trait]
impl MembershipStore for InMemoryStore {
    async fn create_group(&self, group: NewGroup) -> Result<Group, StoreError> {
        let now = self.now();
        let mut state = self.state.write().await;

        let created = Group {
            id: Uuid::new_v4(),
            name: group.name,
            group_type: group.group_type,
            created_by: group.created_by,
            created_at: now,
        };
        state.memberships.push(GroupMembership {
            id: Uuid::new_v4(),
            group_id: created.id,
            user_id: group.created_by,
            role: GroupRole::Owner,
            status: MembershipStatus::Active,
            peer_visibility_access_disabled: false,
            invited_by: None,
            joined_at: Some(now),
            updated_at: now,
        });
        state.groups.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StoreError> {
        Ok(self.state.read().await.groups.get(&group_id).cloned())
    }

    async fn groups_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(Group, GroupMembership)>, StoreError> {
        let state = self.state.read().await;
        let mut groups: Vec<(Group, GroupMembership)> = state
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && m.is_active())
            .filter_map(|m| state.groups.get(&m.group_id).map(|g| (g.clone(), m.clone())))
            .collect();
        groups.sort_by_key(|(g, _)| g.created_at);
        Ok(groups)
    }

    async fn open_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMembership>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .memberships
            .iter()
            .find(|m| m.group_id == group_id && m.user_id == user_id && m.status.is_open())
            .cloned())
    }

    async fn memberships(
        &self,
        group_id: Uuid,
        include_pending: bool,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .memberships
            .iter()
            .filter(|m| m.group_id == group_id)
            .filter(|m| {
                m.status == MembershipStatus::Active
                    || (include_pending && m.status == MembershipStatus::Pending)
            })
            .cloned()
            .collect())
    }

    async fn shared_groups(
        &self,
        viewer_id: Uuid,
        subject_id: Uuid,
    ) -> Result<Vec<(Group, GroupMembership)>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .memberships
            .iter()
            .filter(|m| m.user_id == subject_id && m.is_active())
            .filter(|m| state.active_membership(m.group_id, viewer_id).is_some())
            .filter_map(|m| state.groups.get(&m.group_id).map(|g| (g.clone(), m.clone())))
            .collect())
    }

    async fn create_invitation(
        &self,
        group_id: Uuid,
        invitee_id: Uuid,
        inviter_id: Uuid,
    ) -> Result<GroupInvitation, StoreError> {
        let now = self.now();
        let mut state = self.state.write().await;
        state.group(group_id)?;

        if let Some(existing) = state
            .memberships
            .iter()
            .find(|m| m.group_id == group_id && m.user_id == invitee_id && m.status.is_open())
        {
            return Err(StoreError::Conflict(format!(
                "user already has a {} membership",
                existing.status
            )));
        }

        state.memberships.push(GroupMembership {
            id: Uuid::new_v4(),
            group_id,
            user_id: invitee_id,
            role: GroupRole::Member,
            status: MembershipStatus::Pending,
            peer_visibility_access_disabled: false,
            invited_by: Some(inviter_id),
            joined_at: None,
            updated_at: now,
        });

        let invitation = GroupInvitation {
            id: Uuid::new_v4(),
            group_id,
            invitee_id,
            inviter_id,
            status: InvitationStatus::Pending,
            created_at: now,
            responded_at: None,
        };
        state.invitations.push(invitation.clone());
        Ok(invitation)
    }

    async fn find_invitation(
        &self,
        invitation_id: Uuid,
    ) -> Result<Option<GroupInvitation>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .invitations
            .iter()
            .find(|i| i.id == invitation_id)
            .cloned())
    }

    async fn pending_invitations_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<GroupInvitation>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .invitations
            .iter()
            .filter(|i| i.invitee_id == user_id && i.status == InvitationStatus::Pending)
            .cloned()
            .collect())
    }

    async fn resolve_invitation(
        &self,
        invitation_id: Uuid,
        status: InvitationStatus,
        at: DateTime<Utc>,
    ) -> Result<GroupInvitation, StoreError> {
        let mut state = self.state.write().await;

        let invitation = state
            .invitations
            .iter_mut()
            .find(|i| i.id == invitation_id)
            .ok_or_else(|| StoreError::NotFound(format!("invitation {}", invitation_id)))?;
        if invitation.status != InvitationStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "invitation is already {}",
                invitation.status
            )));
        }
        invitation.status = status;
        invitation.responded_at = Some(at);
        let resolved = invitation.clone();

        if let Some(membership) = state.memberships.iter_mut().find(|m| {
            m.group_id == resolved.group_id
                && m.user_id == resolved.invitee_id
                && m.status == MembershipStatus::Pending
        }) {
            membership.status = status.membership_status();
            membership.updated_at = at;
            if status == InvitationStatus::Accepted {
                membership.joined_at = Some(at);
            }
        }

        Ok(resolved)
    }

    async fn remove_member(&self, group_id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        let now = self.now();
        let mut state = self.state.write().await;
        let membership = state.active_membership_mut(group_id, user_id)?;
        membership.status = MembershipStatus::Removed;
        membership.updated_at = now;
        Ok(())
    }

    async fn set_peer_visibility_disabled(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        disabled: bool,
    ) -> Result<GroupMembership, StoreError> {
        let now = self.now();
        let mut state = self.state.write().await;
        let membership = state.active_membership_mut(group_id, user_id)?;
        membership.peer_visibility_access_disabled = disabled;
        membership.updated_at = now;
        Ok(membership.clone())
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn ensure_user(&self, user_id: Uuid, username: &str) -> Result<User, StoreError> {
        let now = self.now();
        let mut state = self.state.write().await;

        if state
            .users
            .values()
            .any(|u| u.username == username && u.id != user_id)
        {
            return Err(StoreError::Conflict(format!(
                "username {} belongs to another user",
                username
            )));
        }

        let user = state.users.entry(user_id).or_insert_with(|| User {
            id: user_id,
            username: username.to_string(),
            created_at: now,
        });
        user.username = username.to_string();
        Ok(user.clone())
    }

    async fn settings(&self, user_id: Uuid) -> Result<UserSettings, StoreError> {
        let state = self.state.read().await;
        Ok(state.settings.get(&user_id).cloned().unwrap_or_default())
    }

    async fn upsert_settings(
        &self,
        user_id: Uuid,
        settings: &UserSettings,
    ) -> Result<UserSettings, StoreError> {
        let mut state = self.state.write().await;
        state.settings.insert(user_id, settings.clone());
        Ok(settings.clone())
    }
}
