//! HTTP route handlers.

pub mod chronological;
pub mod group_locations;
pub mod groups;
pub mod health;
pub mod locations;
pub mod realtime;
pub mod settings;
pub mod timeline;

use tokio_util::sync::{CancellationToken, DropGuard};

/// Token for one request's store queries.
///
/// Keep the guard alive for the whole handler: axum drops the handler future
/// when the client disconnects, which drops the guard and cancels the token.
pub(crate) fn request_cancellation() -> (CancellationToken, DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}
