use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Backend contracts and their implementations.
pub mod auth;
pub mod data_service;
pub mod mock;
pub mod supabase;

// Core: session/role resolution and the navigation guard.
pub mod navigation;
pub mod session;

pub mod acl;
pub mod config;
pub mod error;
pub mod format;
pub mod handlers;
pub mod models;
pub mod pages;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::Viewer;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use auth::{AuthService, AuthServiceState};
pub use config::AppConfig;
pub use data_service::{DataService, DataServiceState};
pub use error::{AppError, PageError, Result};
pub use mock::MockBackend;
pub use session::{Session, SessionHandle, SessionStore};
pub use supabase::SupabaseClient;

/// ApiDoc
///
/// OpenAPI description of the console's HTTP surface, served at
/// `/api-docs/openapi.json` and browsable through Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_session, handlers::sign_in, handlers::sign_out, handlers::refresh_profile,
        handlers::get_dashboard, handlers::get_profile, handlers::get_nodes, handlers::delete_node,
        handlers::get_routes, handlers::create_route, handlers::toggle_route,
        handlers::delete_route, handlers::get_acls, handlers::get_acl_form, handlers::create_acl,
        handlers::update_acl, handlers::delete_acl, handlers::get_preauth_keys,
        handlers::create_preauth_key, handlers::delete_preauth_key, handlers::get_logs,
        handlers::get_settings, handlers::change_password, handlers::get_users,
        handlers::get_user_form, handlers::update_user, handlers::delete_user
    ),
    components(
        schemas(
            models::Profile, models::Role, models::Node, models::Route, models::Acl,
            models::PreauthKey, models::ActivityLog, models::SignInRequest,
            models::NewRouteRequest, models::AclForm, models::UserUpdate,
            models::PasswordChange, acl::AclRules, acl::AclPolicy, auth::Identity,
            session::SessionState, handlers::SessionView, handlers::NavLink,
            handlers::SignOutResponse, handlers::RoutesView,
            pages::dashboard::DashboardView, pages::profile::ProfileView,
            pages::nodes::NodeView, pages::logs::LogView,
            pages::preauth_keys::PreauthKeyView, pages::preauth_keys::NewPreauthKeyRequest,
            pages::settings::AccountInfo,
        )
    ),
    tags(
        (name = "headscale-admin", description = "Headscale administration console API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single container of shared services handed to every handler. Cloning is
/// cheap: every field is an `Arc` or small config.
#[derive(Clone)]
pub struct AppState {
    /// The process-wide session store (identity, profile, role).
    pub session: SessionHandle,
    /// Table access, scoped by the backend to the signed-in identity.
    pub data: DataServiceState,
    pub auth: AuthServiceState,
    pub config: AppConfig,
}

impl AppState {
    /// Wires a session store over `backend`, which serves both data and auth.
    pub fn new<B>(backend: std::sync::Arc<B>, config: AppConfig) -> Self
    where
        B: DataService + AuthService + 'static,
    {
        let data: DataServiceState = backend.clone();
        let auth: AuthServiceState = backend;
        Self {
            session: SessionStore::new(auth.clone(), data.clone()),
            data,
            auth,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for SessionHandle {
    fn from_ref(app_state: &AppState) -> SessionHandle {
        app_state.session.clone()
    }
}

impl FromRef<AppState> for DataServiceState {
    fn from_ref(app_state: &AppState) -> DataServiceState {
        app_state.data.clone()
    }
}

impl FromRef<AppState> for AuthServiceState {
    fn from_ref(app_state: &AppState) -> AuthServiceState {
        app_state.auth.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Gate for the authenticated and admin routers. Extracting `Viewer` rejects the
/// request before the handler runs when the session is loading or nobody is signed in.
async fn auth_middleware(_viewer: Viewer, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routers, applies the access layers and the observability stack,
/// and registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes()
                .merge(admin::admin_routes())
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer`: method, URI and the request id, so every log line of one
/// request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
