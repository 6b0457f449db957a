//! Shared utilities and common types for the Wayfarer backend.
//!
//! This crate provides functionality used across all other crates:
//! - Caller identity token validation (HS256 JWT)
//! - Common validation logic for coordinates, zoom levels and settings

pub mod jwt;
pub mod validation;
