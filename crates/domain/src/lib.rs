//! Domain layer for the Wayfarer backend.
//!
//! This crate contains:
//! - Domain models (LocationRecord, Group, GroupMembership, UserSettings)
//! - Pure engines: liveness classification, chronology, viewport, visibility
//! - Store traits consumed by the services, plus an in-memory store
//! - The realtime fan-out hub
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;

pub use error::DomainError;
