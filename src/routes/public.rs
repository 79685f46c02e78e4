use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that work whatever the session state. `/session` is how the front end
/// learns whether it is loading, anonymous, awaiting a profile or authenticated.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check; answers "ok" even while the session is still loading.
        .route("/health", get(|| async { "ok" }))
        // GET /session
        // Session snapshot plus the navigation entries it unlocks.
        .route("/session", get(handlers::get_session))
        // POST /auth/sign-in
        .route("/auth/sign-in", post(handlers::sign_in))
        // POST /auth/sign-out
        // Always ends signed out locally; a backend failure is reported in the body.
        .route("/auth/sign-out", post(handlers::sign_out))
}
