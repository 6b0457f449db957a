//! Domain error types.

use thiserror::Error;

use crate::services::store::StoreError;

/// Errors surfaced by domain services.
///
/// Every variant maps onto one HTTP status in the API layer; the mapping
/// lives there, not here.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Missing date component: {0}")]
    MissingDateComponent(&'static str),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("A pending invitation already exists for this user")]
    DuplicateInvitation,

    #[error("User is already a member of this group")]
    AlreadyMember,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DomainError {
    /// True for errors caused by the caller's input rather than by state.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DomainError::MissingDateComponent(_)
                | DomainError::InvalidDate(_)
                | DomainError::Validation(_)
        )
    }
}
