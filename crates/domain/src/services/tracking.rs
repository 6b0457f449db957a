//! Location ingestion and the chronological, viewport and group-map queries.
//!
//! Every query resolves its subjects through the visibility rules first,
//! then issues bounded store queries, then classifies liveness per subject.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::chronology::{DateSelector, NavigationAvailability};
use crate::models::location::{
    CreateLocationRequest, LocationRecord, LocationStats, ViewportRequest, ViewportResponse,
};
use crate::models::user::{Caller, SettingsResponse, UpdateSettingsRequest, User, UserSettings};
use crate::services::cancel::cancellable;
use crate::services::chronology;
use crate::services::clock::Clock;
use crate::services::fanout::{EventKind, FanOutHub, RealtimeEvent, Topic};
use crate::services::groups::subjects_in_group;
use crate::services::liveness::{
    self, annotate, classify, ClassifiedLocation, DEFAULT_THRESHOLD_MINUTES,
};
use crate::services::store::{LocationStore, MembershipStore, UserDirectory};
use crate::services::viewport::{self, BoundingBox};
use crate::services::visibility::{self, Grant, VisibilityInput, VisibilityPurpose};

/// Tunables applied by [`TrackingService`].
#[derive(Debug, Clone)]
pub struct TrackingPolicy {
    /// Threshold used when a subject has none configured.
    pub default_threshold_minutes: i32,
    /// Lets unauthenticated visitors read public timelines.
    pub allow_anonymous_public_timeline: bool,
    /// Upper bound on subjects in one group query.
    pub max_group_query_subjects: usize,
}

impl Default for TrackingPolicy {
    fn default() -> Self {
        Self {
            default_threshold_minutes: DEFAULT_THRESHOLD_MINUTES,
            allow_anonymous_public_timeline: false,
            max_group_query_subjects: 100,
        }
    }
}

/// Location queries and writes.
pub struct TrackingService {
    locations: Arc<dyn LocationStore>,
    memberships: Arc<dyn MembershipStore>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    hub: Arc<FanOutHub>,
    policy: TrackingPolicy,
}

impl TrackingService {
    pub fn new(
        locations: Arc<dyn LocationStore>,
        memberships: Arc<dyn MembershipStore>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
        hub: Arc<FanOutHub>,
        policy: TrackingPolicy,
    ) -> Self {
        Self {
            locations,
            memberships,
            users,
            clock,
            hub,
            policy,
        }
    }

    pub fn policy(&self) -> &TrackingPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn threshold_for(&self, user_id: Uuid) -> Result<i32, DomainError> {
        let settings = self.users.settings(user_id).await?;
        Ok(settings.threshold_or(self.policy.default_threshold_minutes))
    }

    async fn viewer_today(&self, viewer: Uuid) -> Result<NaiveDate, DomainError> {
        let settings = self.users.settings(viewer).await?;
        Ok(chronology::viewer_today(self.now(), settings.local_offset()))
    }

    /// Classifies records of any number of subjects, each against its own
    /// threshold and its own overall latest record.
    async fn classify_for_subjects(
        &self,
        records: Vec<LocationRecord>,
        subjects: &[Uuid],
    ) -> Result<Vec<ClassifiedLocation>, DomainError> {
        let latest: HashMap<Uuid, i64> = self
            .locations
            .latest_for_owners(subjects)
            .await?
            .into_iter()
            .map(|r| (r.owner_id, r.id))
            .collect();

        let mut thresholds = HashMap::with_capacity(subjects.len());
        for subject in subjects {
            thresholds.insert(*subject, self.threshold_for(*subject).await?);
        }

        let now = self.now();
        Ok(records
            .into_iter()
            .map(|record| {
                let threshold = thresholds
                    .get(&record.owner_id)
                    .copied()
                    .unwrap_or(self.policy.default_threshold_minutes);
                let is_latest = latest.get(&record.owner_id) == Some(&record.id);
                ClassifiedLocation {
                    liveness: classify(&record, threshold, is_latest, now),
                    location_time_threshold_minutes: threshold,
                    record,
                }
            })
            .collect())
    }

    /// The caller's records within one day, month or year.
    pub async fn chronological(
        &self,
        caller: &Caller,
        selector: &DateSelector,
        cancel: &CancellationToken,
    ) -> Result<Vec<ClassifiedLocation>, DomainError> {
        let range = chronology::resolve(selector)?;
        cancellable(cancel, async {
            let records = self.locations.find_in_range(caller.user_id, range).await?;
            self.classify_for_subjects(records, &[caller.user_id]).await
        })
        .await
    }

    pub async fn stats(
        &self,
        caller: &Caller,
        selector: &DateSelector,
        cancel: &CancellationToken,
    ) -> Result<LocationStats, DomainError> {
        let range = chronology::resolve(selector)?;
        cancellable(cancel, async {
            Ok::<_, DomainError>(self.locations.stats_in_range(caller.user_id, range).await?)
        })
        .await
    }

    pub async fn has_data(
        &self,
        caller: &Caller,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<bool, DomainError> {
        let range = chronology::day_range(date)?;
        cancellable(cancel, async {
            Ok::<_, DomainError>(self.locations.exists_in_range(caller.user_id, range).await?)
        })
        .await
    }

    /// Navigation availability in the caller's local frame.
    pub async fn navigation(
        &self,
        caller: &Caller,
        selector: &DateSelector,
    ) -> Result<NavigationAvailability, DomainError> {
        let today = self.viewer_today(caller.user_id).await?;
        chronology::navigation_availability(selector, today)
    }

    /// Viewport query over the caller's own history.
    pub async fn own_viewport(
        &self,
        caller: &Caller,
        request: &ViewportRequest,
        cancel: &CancellationToken,
    ) -> Result<ViewportResponse, DomainError> {
        let bbox = BoundingBox::from_request(request)?;
        let selector = viewport::selector_from_request(request)?;
        let today = self.viewer_today(caller.user_id).await?;
        let range = viewport::effective_range(selector.as_ref(), 1, today)?;

        let subjects = [caller.user_id];
        let results = cancellable(cancel, async {
            let records = self
                .locations
                .find_in_viewport(&subjects, &bbox, range)
                .await?;
            self.classify_for_subjects(records, &subjects).await
        })
        .await?;

        Ok(ViewportResponse {
            total_items: results.len(),
            results,
            zoom_level: request.zoom_level,
        })
    }

    /// Resolves the subjects of a group query.
    ///
    /// An empty request means every subject visible to the caller; asking
    /// for anyone outside that set is forbidden.
    async fn group_subjects(
        &self,
        caller: &Caller,
        group_id: Uuid,
        requested: &[Uuid],
    ) -> Result<Vec<Uuid>, DomainError> {
        let visible = subjects_in_group(
            self.memberships.as_ref(),
            caller.user_id,
            group_id,
            VisibilityPurpose::Map,
        )
        .await?;

        let subjects = if requested.is_empty() {
            visible
        } else {
            if let Some(hidden) = requested.iter().find(|id| !visible.contains(id)) {
                return Err(DomainError::Forbidden(format!(
                    "Locations of user {} are not visible in this group",
                    hidden
                )));
            }
            let mut subjects = requested.to_vec();
            subjects.sort();
            subjects.dedup();
            subjects
        };

        if subjects.len() > self.policy.max_group_query_subjects {
            return Err(DomainError::Validation(format!(
                "At most {} users can be queried at once",
                self.policy.max_group_query_subjects
            )));
        }
        Ok(subjects)
    }

    /// Latest location of each requested, visible group member that has data.
    pub async fn group_latest(
        &self,
        caller: &Caller,
        group_id: Uuid,
        include_user_ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<ClassifiedLocation>, DomainError> {
        let subjects = self.group_subjects(caller, group_id, include_user_ids).await?;
        cancellable(cancel, async {
            let latest = self.locations.latest_for_owners(&subjects).await?;
            self.classify_for_subjects(latest, &subjects).await
        })
        .await
    }

    /// Viewport query over visible members of a group.
    pub async fn group_viewport(
        &self,
        caller: &Caller,
        group_id: Uuid,
        request: &ViewportRequest,
        cancel: &CancellationToken,
    ) -> Result<ViewportResponse, DomainError> {
        let bbox = BoundingBox::from_request(request)?;
        let selector = viewport::selector_from_request(request)?;
        let subjects = self
            .group_subjects(caller, group_id, &request.user_ids)
            .await?;
        let today = self.viewer_today(caller.user_id).await?;
        let range = viewport::effective_range(selector.as_ref(), subjects.len(), today)?;

        let results = cancellable(cancel, async {
            let records = self
                .locations
                .find_in_viewport(&subjects, &bbox, range)
                .await?;
            self.classify_for_subjects(records, &subjects).await
        })
        .await?;

        Ok(ViewportResponse {
            total_items: results.len(),
            results,
            zoom_level: request.zoom_level,
        })
    }

    async fn user_by_username(&self, username: &str) -> Result<User, DomainError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("User {} not found", username)))
    }

    /// Evaluates the visibility rules for one viewer/subject pair.
    pub async fn can_view(
        &self,
        viewer: Option<Uuid>,
        subject: Uuid,
        group_context: Option<Uuid>,
        at: Option<DateTime<Utc>>,
    ) -> Result<Option<Grant>, DomainError> {
        let shared_groups = match viewer {
            Some(viewer) if viewer != subject => {
                self.memberships.shared_groups(viewer, subject).await?
            }
            _ => Vec::new(),
        };
        let settings = self.users.settings(subject).await?;

        Ok(visibility::evaluate(&VisibilityInput {
            viewer,
            subject,
            group_context,
            shared_groups: &shared_groups,
            subject_threshold_minutes: settings.threshold_or(self.policy.default_threshold_minutes),
            subject_settings: &settings,
            at,
            now: self.now(),
            allow_anonymous_public_timeline: self.policy.allow_anonymous_public_timeline,
        }))
    }

    /// Recent records a visitor may see on a user's public timeline.
    pub async fn public_timeline(
        &self,
        viewer: Option<&Caller>,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ClassifiedLocation>, DomainError> {
        let subject = self.user_by_username(username).await?;
        let settings = self.users.settings(subject.id).await?;
        if !settings.public_timeline_enabled {
            return Err(DomainError::Forbidden(
                "This user's timeline is not public".to_string(),
            ));
        }

        let threshold = settings.threshold_or(self.policy.default_threshold_minutes);
        let now = self.now();
        let since = now - Duration::minutes(i64::from(threshold) + 1);
        let viewer = viewer.map(|c| c.user_id);

        let records = cancellable(cancel, async {
            let records = self.locations.find_since(subject.id, since).await?;
            let latest = self.locations.latest_for_owners(&[subject.id]).await?;
            Ok::<_, DomainError>((records, latest.first().map(|r| r.id)))
        })
        .await?;

        let (records, latest_id) = records;
        let visible: Vec<LocationRecord> = records
            .into_iter()
            .filter(|record| {
                let grant = visibility::evaluate(&VisibilityInput {
                    viewer,
                    subject: subject.id,
                    group_context: None,
                    shared_groups: &[],
                    subject_settings: &settings,
                    subject_threshold_minutes: threshold,
                    at: Some(record.captured_at),
                    now,
                    allow_anonymous_public_timeline: self.policy.allow_anonymous_public_timeline,
                });
                grant.is_some()
            })
            .collect();

        Ok(annotate(visible, latest_id, threshold, now))
    }

    /// Ensures the caller may follow `username`'s location stream.
    pub async fn authorize_location_stream(
        &self,
        caller: &Caller,
        username: &str,
    ) -> Result<User, DomainError> {
        let subject = self.user_by_username(username).await?;
        match self.can_view(Some(caller.user_id), subject.id, None, None).await? {
            Some(_) => Ok(subject),
            None => Err(DomainError::Forbidden(format!(
                "Not allowed to follow {}",
                username
            ))),
        }
    }

    /// When the subject's latest record stops being Live, if it is Live now.
    pub async fn next_liveness_transition(
        &self,
        subject: Uuid,
    ) -> Result<Option<DateTime<Utc>>, DomainError> {
        let latest = self.locations.latest_for_owners(&[subject]).await?;
        let classified = self.classify_for_subjects(latest, &[subject]).await?;
        Ok(liveness::next_transition(&classified, self.now()))
    }

    /// Topics to notify when `caller`'s locations change.
    async fn location_topics(&self, caller: &Caller) -> Vec<Topic> {
        let mut topics = vec![Topic::UserLocation(caller.username.clone())];
        match self.memberships.groups_for_user(caller.user_id).await {
            Ok(groups) => topics.extend(
                groups
                    .iter()
                    .filter(|(group, membership)| visibility::peer_visible(group, membership))
                    .map(|(group, _)| Topic::Group(group.id)),
            ),
            Err(e) => warn!(
                user_id = %caller.user_id,
                error = %e,
                "Failed to load groups for location fan-out"
            ),
        }
        topics
    }

    async fn publish_location_change(&self, caller: &Caller, kind: EventKind) {
        let now = self.now();
        let events: Vec<RealtimeEvent> = self
            .location_topics(caller)
            .await
            .into_iter()
            .map(|topic| RealtimeEvent::new(kind, topic, now).with_user(caller.user_id))
            .collect();
        self.hub.publish_all(events);
    }

    /// Stores a location for the caller and notifies followers.
    pub async fn record_location(
        &self,
        caller: &Caller,
        request: CreateLocationRequest,
    ) -> Result<ClassifiedLocation, DomainError> {
        let record = self
            .locations
            .insert(request.into_new_location(caller.user_id))
            .await?;

        info!(
            user_id = %caller.user_id,
            location_id = record.id,
            "Location recorded"
        );

        self.publish_location_change(caller, EventKind::LocationCreated)
            .await;

        let mut classified = self
            .classify_for_subjects(vec![record], &[caller.user_id])
            .await?;
        classified
            .pop()
            .ok_or_else(|| DomainError::NotFound("Recorded location vanished".to_string()))
    }

    pub async fn delete_location(&self, caller: &Caller, id: i64) -> Result<(), DomainError> {
        if !self.locations.delete(caller.user_id, id).await? {
            return Err(DomainError::NotFound(format!("Location {} not found", id)));
        }

        info!(user_id = %caller.user_id, location_id = id, "Location deleted");
        self.publish_location_change(caller, EventKind::LocationDeleted)
            .await;
        Ok(())
    }

    pub async fn delete_locations(&self, caller: &Caller, ids: &[i64]) -> Result<u64, DomainError> {
        let deleted = self.locations.delete_many(caller.user_id, ids).await?;

        info!(
            user_id = %caller.user_id,
            requested = ids.len(),
            deleted,
            "Locations bulk deleted"
        );
        if deleted > 0 {
            self.publish_location_change(caller, EventKind::LocationDeleted)
                .await;
        }
        Ok(deleted)
    }

    fn settings_response(&self, settings: UserSettings) -> SettingsResponse {
        SettingsResponse {
            effective_threshold_minutes: settings
                .threshold_or(self.policy.default_threshold_minutes),
            settings,
        }
    }

    pub async fn settings(&self, caller: &Caller) -> Result<SettingsResponse, DomainError> {
        let settings = self.users.settings(caller.user_id).await?;
        Ok(self.settings_response(settings))
    }

    pub async fn update_settings(
        &self,
        caller: &Caller,
        request: &UpdateSettingsRequest,
    ) -> Result<SettingsResponse, DomainError> {
        let current = self.users.settings(caller.user_id).await?;
        let updated = self
            .users
            .upsert_settings(caller.user_id, &request.apply(current))
            .await?;

        info!(
            user_id = %caller.user_id,
            public_timeline_enabled = updated.public_timeline_enabled,
            "Settings updated"
        );
        Ok(self.settings_response(updated))
    }
}
