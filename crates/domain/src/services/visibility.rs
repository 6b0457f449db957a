//! Who may see whose locations.
//!
//! Rules are checked in order and the first that applies wins:
//! 1. viewers always see themselves;
//! 2. active co-members of a group see each other, unless the group is an
//!    organization and the subject opted out of peer visibility;
//! 3. a public timeline exposes records within the subject's threshold;
//! 4. nothing else is visible.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::group::{Group, GroupMembership};
use crate::models::user::UserSettings;
use crate::services::liveness::age_minutes;

/// The rule that made a subject visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "camelCase")]
pub enum Grant {
    #[serde(rename = "self")]
    SelfView,
    #[serde(rename_all = "camelCase")]
    GroupPeer { group_id: Uuid },
    PublicTimeline,
}

/// What a member listing is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityPurpose {
    /// Members whose locations the viewer may see on the map.
    Map,
    /// Every active member, for the owner's management view.
    Administrative,
}

/// Everything needed to decide one viewer/subject pair.
#[derive(Debug, Clone)]
pub struct VisibilityInput<'a> {
    /// `None` for anonymous visitors.
    pub viewer: Option<Uuid>,
    pub subject: Uuid,
    /// Restricts rule 2 to a single group.
    pub group_context: Option<Uuid>,
    /// Groups where viewer and subject are both active, with the subject's membership.
    pub shared_groups: &'a [(Group, GroupMembership)],
    pub subject_settings: &'a UserSettings,
    pub subject_threshold_minutes: i32,
    /// Instant being viewed; `None` asks about the subject's current position.
    pub at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
    pub allow_anonymous_public_timeline: bool,
}

/// Returns true if `subject_membership` is visible to other members of `group`.
pub fn peer_visible(group: &Group, subject_membership: &GroupMembership) -> bool {
    subject_membership.is_active()
        && !(group.group_type.honours_peer_opt_out()
            && subject_membership.peer_visibility_access_disabled)
}

/// Evaluates the visibility rules, returning the first grant that applies.
pub fn evaluate(input: &VisibilityInput<'_>) -> Option<Grant> {
    if input.viewer == Some(input.subject) {
        return Some(Grant::SelfView);
    }

    if input.viewer.is_some() {
        let peer_grant = input
            .shared_groups
            .iter()
            .filter(|(group, _)| input.group_context.map_or(true, |id| id == group.id))
            .find(|(group, membership)| {
                membership.user_id == input.subject && peer_visible(group, membership)
            });
        if let Some((group, _)) = peer_grant {
            return Some(Grant::GroupPeer { group_id: group.id });
        }
    }

    if input.subject_settings.public_timeline_enabled
        && (input.viewer.is_some() || input.allow_anonymous_public_timeline)
    {
        let at = input.at.unwrap_or(input.now);
        if age_minutes(&at, input.now) <= i64::from(input.subject_threshold_minutes) {
            return Some(Grant::PublicTimeline);
        }
    }

    None
}

/// Subjects of `group` the viewer may list for `purpose`.
///
/// The viewer must be an active member; the administrative listing also
/// requires ownership.
pub fn visible_subjects(
    viewer: Uuid,
    group: &Group,
    memberships: &[GroupMembership],
    purpose: VisibilityPurpose,
) -> Result<Vec<Uuid>, DomainError> {
    let viewer_membership = memberships
        .iter()
        .find(|m| m.user_id == viewer && m.is_active())
        .ok_or_else(|| DomainError::Forbidden("Not a member of this group".to_string()))?;

    let active = memberships.iter().filter(|m| m.is_active());

    match purpose {
        VisibilityPurpose::Administrative => {
            if !viewer_membership.role.can_view_administrative() {
                return Err(DomainError::Forbidden(
                    "Only the group owner can view all members".to_string(),
                ));
            }
            Ok(active.map(|m| m.user_id).collect())
        }
        VisibilityPurpose::Map => Ok(active
            .filter(|m| m.user_id == viewer || peer_visible(group, m))
            .map(|m| m.user_id)
            .collect()),
    }
}
