//! Topic-scoped realtime fan-out.
//!
//! Delivery is at-most-once with no replay. Each topic has a bounded
//! broadcast channel; a subscriber that falls behind skips the frames it
//! missed. Topics without subscribers are dropped on the next publish.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Serialize, Serializer};
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Default per-topic channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// A realtime topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Location changes of one user, addressed by username.
    UserLocation(String),
    /// Location and membership changes inside one group.
    Group(Uuid),
    /// Invitations and membership changes concerning one user.
    Membership(Uuid),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::UserLocation(username) => write!(f, "location-update-{}", username),
            Topic::Group(group_id) => write!(f, "group-{}", group_id),
            Topic::Membership(user_id) => write!(f, "membership-update-{}", user_id),
        }
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    LocationCreated,
    LocationDeleted,
    MemberInvited,
    MemberJoined,
    MemberDeclined,
    MemberRemoved,
    InvitationRevoked,
    PeerVisibilityChanged,
    LivenessExpired,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::LocationCreated => "location-created",
            EventKind::LocationDeleted => "location-deleted",
            EventKind::MemberInvited => "member-invited",
            EventKind::MemberJoined => "member-joined",
            EventKind::MemberDeclined => "member-declined",
            EventKind::MemberRemoved => "member-removed",
            EventKind::InvitationRevoked => "invitation-revoked",
            EventKind::PeerVisibilityChanged => "peer-visibility-changed",
            EventKind::LivenessExpired => "liveness-expired",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A "something changed, re-fetch" signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeEvent {
    pub kind: EventKind,
    pub topic: Topic,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

impl RealtimeEvent {
    pub fn new(kind: EventKind, topic: Topic, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            topic,
            user_id: None,
            group_id: None,
            occurred_at,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_group(mut self, group_id: Uuid) -> Self {
        self.group_id = Some(group_id);
        self
    }
}

/// In-process publish/subscribe hub keyed by [`Topic`].
#[derive(Debug)]
pub struct FanOutHub {
    topics: DashMap<Topic, broadcast::Sender<RealtimeEvent>>,
    capacity: usize,
}

impl Default for FanOutHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl FanOutHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Subscribes to a topic, creating its channel on first use.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<RealtimeEvent> {
        let capacity = self.capacity;
        self.topics
            .entry(topic)
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe()
    }

    /// Publishes an event on its topic and returns how many subscribers
    /// received it. Publishing to a topic nobody listens on is a no-op.
    pub fn publish(&self, event: RealtimeEvent) -> usize {
        let topic = event.topic.clone();
        let kind = event.kind;

        // The shard guard must be released before `remove_if` below.
        let delivered = match self.topics.get(&topic) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        };

        if delivered == 0 {
            self.topics
                .remove_if(&topic, |_, sender| sender.receiver_count() == 0);
        }

        metrics::counter!("realtime_events_published_total", "kind" => kind.as_str())
            .increment(1);
        metrics::counter!("realtime_events_delivered_total", "kind" => kind.as_str())
            .increment(delivered as u64);

        debug!(topic = %topic, kind = %kind, delivered, "Published realtime event");
        delivered
    }

    /// Publishes several events, returning the total deliveries.
    pub fn publish_all<I>(&self, events: I) -> usize
    where
        I: IntoIterator<Item = RealtimeEvent>,
    {
        events.into_iter().map(|event| self.publish(event)).sum()
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Number of topics with a live channel.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}
