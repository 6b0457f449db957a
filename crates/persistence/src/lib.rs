//! Persistence layer for Wayfarer.
//!
//! This crate contains:
//! - Database connection management and embedded migrations
//! - Entity definitions (database row mappings)
//! - PostgreSQL implementations of the domain store traits

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;

pub use repositories::{LocationRepository, MembershipRepository, UserRepository};
