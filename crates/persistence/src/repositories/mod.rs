//! PostgreSQL implementations of the domain store traits.

pub mod group;
pub mod location;
pub mod user;

pub use group::MembershipRepository;
pub use location::LocationRepository;
pub use user::UserRepository;

use domain::services::StoreError;

/// PostgreSQL error code for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Maps a driver error onto the store error taxonomy.
pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Conflict(
                db_err
                    .constraint()
                    .map(|c| format!("constraint {} violated", c))
                    .unwrap_or_else(|| "Resource already exists".to_string()),
            )
        }
        _ => {
            tracing::error!(error = %err, "Database error");
            StoreError::Backend(err.to_string())
        }
    }
}
