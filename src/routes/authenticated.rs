use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

/// Authenticated Router Module
///
/// The pages every signed-in identity may open. The `Viewer` middleware layered on
/// this router rejects requests while the session is loading (503) or anonymous
/// (401). Pages that need the profile answer 202 until it is available.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /session/refresh-profile
        // Manual retry after a failed or missing profile lookup.
        .route("/session/refresh-profile", post(handlers::refresh_profile))
        .route("/dashboard", get(handlers::get_dashboard))
        .route("/profile", get(handlers::get_profile))
        // --- Nodes ---
        .route("/nodes", get(handlers::get_nodes))
        .route("/nodes/{id}", delete(handlers::delete_node))
        // --- Routes ---
        .route(
            "/routes",
            get(handlers::get_routes).post(handlers::create_route),
        )
        .route("/routes/{id}", delete(handlers::delete_route))
        .route("/routes/{id}/toggle", patch(handlers::toggle_route))
        // --- ACLs ---
        .route("/acls", get(handlers::get_acls).post(handlers::create_acl))
        .route(
            "/acls/{id}",
            put(handlers::update_acl).delete(handlers::delete_acl),
        )
        .route("/acls/{id}/form", get(handlers::get_acl_form))
        // --- Pre-auth Keys ---
        .route(
            "/preauth-keys",
            get(handlers::get_preauth_keys).post(handlers::create_preauth_key),
        )
        .route("/preauth-keys/{id}", delete(handlers::delete_preauth_key))
        // --- Logs & Settings ---
        .route("/logs", get(handlers::get_logs))
        .route("/settings", get(handlers::get_settings))
        .route("/settings/password", post(handlers::change_password))
}
