//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod group;
pub mod location;
pub mod user;

pub use group::*;
pub use location::*;
pub use user::*;
