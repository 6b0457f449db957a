//! Domain services for Wayfarer.
//!
//! Pure engines (liveness, chronology, viewport, visibility) sit beside the
//! stateful services that orchestrate them over the store traits.

pub mod cancel;
pub mod chronology;
pub mod clock;
pub mod fanout;
pub mod groups;
pub mod liveness;
pub mod memory;
pub mod store;
pub mod tracking;
pub mod viewport;
pub mod visibility;

pub use clock::{Clock, FixedClock, SystemClock};
pub use fanout::{EventKind, FanOutHub, RealtimeEvent, Topic};
pub use groups::GroupService;
pub use liveness::{ClassifiedLocation, Liveness, LivenessRefresh};
pub use memory::InMemoryStore;
pub use store::{LocationStore, MembershipStore, StoreError, UserDirectory};
pub use tracking::{TrackingPolicy, TrackingService};
pub use viewport::BoundingBox;
pub use visibility::{Grant, VisibilityPurpose};
