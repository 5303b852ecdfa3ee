use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Access Router Module
///
/// Read-only endpoints that evaluate the caller's own cookie against the
/// route table. They answer for every caller, anonymous ones included, and
/// never redirect.
pub fn access_routes() -> Router<AppState> {
    Router::new()
        // GET /api/access/check?path=/posts
        // The verdict the gate would reach for that page.
        .route("/api/access/check", get(handlers::check_access))
        // GET /api/access/navigation
        // Dashboard routes open to the caller's role, for the sidebar.
        .route("/api/access/navigation", get(handlers::get_navigation))
}
