//! Domain models for Wayfarer.

pub mod chronology;
pub mod group;
pub mod location;
pub mod user;

pub use chronology::{DateRange, DateSelector, DateType};
pub use group::{
    Group, GroupInvitation, GroupMembership, GroupRole, GroupType, InvitationStatus,
    MembershipStatus,
};
pub use location::{LocationRecord, LocationStats, NewLocation};
pub use user::{Caller, User, UserSettings};
