//! Server-sent event streams over the fan-out hub.
//!
//! Frames are "something changed, re-fetch" signals: the event name is the
//! [`EventKind`] and the data is the JSON-encoded [`RealtimeEvent`]. Slow
//! subscribers skip frames rather than stall publishers. Group and location
//! streams close as soon as the caller loses access.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use domain::models::Caller;
use domain::services::liveness::delay_until;
use domain::services::{
    EventKind, GroupService, LivenessRefresh, RealtimeEvent, Topic, TrackingService,
    VisibilityPurpose,
};
use domain::DomainError;
use futures::{stream, Stream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;
use crate::middleware::RequestId;

/// Re-classification timer for one followed subject.
struct LivenessWatch {
    tracking: Arc<TrackingService>,
    subject: Uuid,
    topic: Topic,
    refresh: LivenessRefresh,
    ticks: mpsc::Receiver<u64>,
}

impl LivenessWatch {
    fn new(tracking: Arc<TrackingService>, subject: Uuid, topic: Topic) -> Self {
        let (refresh, ticks) = LivenessRefresh::new();
        Self {
            tracking,
            subject,
            topic,
            refresh,
            ticks,
        }
    }

    /// Arms the timer for the subject's next Live to Latest transition, or
    /// disarms it when nothing is Live.
    async fn reschedule(&self) {
        match self.tracking.next_liveness_transition(self.subject).await {
            Ok(Some(at)) => {
                let now = self.tracking.now();
                if at > now {
                    let generation = self.refresh.schedule(delay_until(at, now));
                    debug!(subject = %self.subject, %at, generation, "Liveness refresh armed");
                } else {
                    self.refresh.cancel();
                }
            }
            Ok(None) => self.refresh.cancel(),
            Err(e) => {
                warn!(subject = %self.subject, error = %e, "Failed to compute liveness transition");
                self.refresh.cancel();
            }
        }
    }

    fn expired_event(&self) -> RealtimeEvent {
        RealtimeEvent::new(
            EventKind::LivenessExpired,
            self.topic.clone(),
            self.tracking.now(),
        )
        .with_user(self.subject)
    }
}

async fn next_tick(liveness: &mut Option<LivenessWatch>) -> Option<u64> {
    match liveness {
        Some(watch) => watch.ticks.recv().await,
        None => std::future::pending().await,
    }
}

/// Who may keep reading a stream after it opened.
enum StreamAccess {
    /// Addressed to the caller; never revoked.
    Own,
    GroupMember {
        groups: Arc<GroupService>,
        caller: Caller,
        group_id: Uuid,
    },
    Follower {
        tracking: Arc<TrackingService>,
        viewer: Uuid,
        subject: Uuid,
    },
}

impl StreamAccess {
    /// Whether `event` can change the outcome of [`StreamAccess::granted`].
    /// `None` stands for a liveness tick.
    fn affected_by(&self, event: Option<&RealtimeEvent>) -> bool {
        match self {
            StreamAccess::Own => false,
            StreamAccess::GroupMember { .. } => event.is_some_and(|event| {
                matches!(
                    event.kind,
                    EventKind::MemberRemoved | EventKind::PeerVisibilityChanged
                )
            }),
            StreamAccess::Follower { .. } => true,
        }
    }

    async fn granted(&self) -> bool {
        match self {
            StreamAccess::Own => true,
            StreamAccess::GroupMember {
                groups,
                caller,
                group_id,
            } => match groups
                .visible_subjects(caller, *group_id, VisibilityPurpose::Map)
                .await
            {
                Ok(_) => true,
                Err(DomainError::Forbidden(_) | DomainError::NotFound(_)) => false,
                Err(e) => {
                    warn!(group_id = %group_id, error = %e, "Failed to re-check group stream access");
                    false
                }
            },
            StreamAccess::Follower {
                tracking,
                viewer,
                subject,
            } => match tracking.can_view(Some(*viewer), *subject, None, None).await {
                Ok(grant) => grant.is_some(),
                Err(e) => {
                    warn!(subject = %subject, error = %e, "Failed to re-check location stream access");
                    false
                }
            },
        }
    }
}

struct EventStream {
    topic: Topic,
    events: broadcast::Receiver<RealtimeEvent>,
    liveness: Option<LivenessWatch>,
    access: StreamAccess,
}

impl EventStream {
    fn new(state: &AppState, topic: Topic, access: StreamAccess) -> Self {
        Self {
            events: state.hub.subscribe(topic.clone()),
            topic,
            liveness: None,
            access,
        }
    }

    async fn with_liveness(mut self, tracking: Arc<TrackingService>, subject: Uuid) -> Self {
        let watch = LivenessWatch::new(tracking, subject, self.topic.clone());
        watch.reschedule().await;
        self.liveness = Some(watch);
        self
    }

    /// False once the caller may no longer read this stream.
    async fn still_allowed(&self, event: Option<&RealtimeEvent>) -> bool {
        if !self.access.affected_by(event) || self.access.granted().await {
            return true;
        }
        info!(topic = %self.topic, "Access revoked, closing stream");
        false
    }

    async fn next_event(&mut self) -> Option<RealtimeEvent> {
        loop {
            tokio::select! {
                received = self.events.recv() => match received {
                    Ok(event) => {
                        if !self.still_allowed(Some(&event)).await {
                            return None;
                        }
                        if let Some(watch) = &self.liveness {
                            watch.reschedule().await;
                        }
                        return Some(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(topic = %self.topic, skipped, "Subscriber lagged, frames skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
                Some(generation) = next_tick(&mut self.liveness) => {
                    let Some(watch) = &self.liveness else { continue };
                    if !watch.refresh.is_current(generation) {
                        continue;
                    }
                    if !self.still_allowed(None).await {
                        return None;
                    }
                    let event = watch.expired_event();
                    watch.reschedule().await;
                    return Some(event);
                }
            }
        }
    }

    fn into_stream(self) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
        stream::unfold(self, |mut state| async move {
            loop {
                let event = state.next_event().await?;
                match serde_json::to_string(&event) {
                    Ok(data) => {
                        let frame = Event::default().event(event.kind.as_str()).data(data);
                        return Some((Ok::<_, Infallible>(frame), state));
                    }
                    Err(e) => warn!(topic = %state.topic, error = %e, "Failed to encode event"),
                }
            }
        })
    }
}

fn sse_response(
    state: &AppState,
    events: EventStream,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    Sse::new(events.into_stream()).keep_alive(
        KeepAlive::new().interval(Duration::from_secs(state.config.realtime.keep_alive_secs)),
    )
}

fn request_id(extension: &Option<Extension<RequestId>>) -> &str {
    extension
        .as_ref()
        .map(|Extension(RequestId(id))| id.as_str())
        .unwrap_or("-")
}

/// Location updates of a user the caller may see.
///
/// GET /api/v1/sse/stream/location-update/:username
pub async fn location_stream(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path(username): Path<String>,
    request: Option<Extension<RequestId>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let subject = state
        .tracking
        .authorize_location_stream(&user_auth.caller(), &username)
        .await?;

    let access = StreamAccess::Follower {
        tracking: state.tracking.clone(),
        viewer: user_auth.user_id,
        subject: subject.id,
    };
    let topic = Topic::UserLocation(subject.username.clone());
    let events = EventStream::new(&state, topic, access)
        .with_liveness(state.tracking.clone(), subject.id)
        .await;

    info!(
        request_id = request_id(&request),
        user_id = %user_auth.user_id,
        jti = %user_auth.jti,
        subject = %subject.username,
        "Location stream opened"
    );

    Ok(sse_response(&state, events))
}

/// Location and membership changes inside a group the caller belongs to.
///
/// GET /api/v1/sse/group/:group_id
pub async fn group_stream(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path(group_id): Path<Uuid>,
    request: Option<Extension<RequestId>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let caller = user_auth.caller();
    state
        .groups
        .visible_subjects(&caller, group_id, VisibilityPurpose::Map)
        .await?;

    let access = StreamAccess::GroupMember {
        groups: state.groups.clone(),
        caller,
        group_id,
    };
    let events = EventStream::new(&state, Topic::Group(group_id), access);

    info!(
        request_id = request_id(&request),
        user_id = %user_auth.user_id,
        group_id = %group_id,
        "Group stream opened"
    );

    Ok(sse_response(&state, events))
}

/// Invitations and membership changes addressed to the caller.
///
/// GET /api/v1/sse/membership
pub async fn membership_stream(
    State(state): State<AppState>,
    user_auth: UserAuth,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let events = EventStream::new(
        &state,
        Topic::Membership(user_auth.user_id),
        StreamAccess::Own,
    );
    debug!(user_id = %user_auth.user_id, "Membership stream opened");
    Ok(sse_response(&state, events))
}
