use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// User management. Every handler evaluates the navigation guard against a fresh
/// session snapshot, so a viewer demoted mid-session is redirected to the landing
/// route on the very next request.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /users?search=...
        .route("/users", get(handlers::get_users))
        // PUT/DELETE /users/{id}
        .route(
            "/users/{id}",
            put(handlers::update_user).delete(handlers::delete_user),
        )
        // GET /users/{id}/form
        // The edit form, expiration reduced to a calendar date.
        .route("/users/{id}/form", get(handlers::get_user_form))
}
