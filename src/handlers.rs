use std::time::Duration;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::{AuthServiceState, Identity, Viewer},
    data_service::DataServiceState,
    error::{AppError, PageError},
    models::{Acl, AclForm, NewRouteRequest, Node, PasswordChange, Profile, Role, SignInRequest, UserUpdate},
    navigation::{LANDING_ROUTE, NavigationEntry, default_navigation, guard_route, visible_entries},
    pages::{
        acls::AclsPage,
        dashboard::{self, DashboardView},
        logs::{LogView, LogsPage},
        nodes::{NodeView, NodesPage},
        preauth_keys::{NewPreauthKeyRequest, PreauthKeyView, PreauthKeysPage, key_status},
        profile::ProfileView,
        routes::{RouteView, RoutesPage},
        settings::{self, AccountInfo},
        users::UsersPage,
    },
    session::{Session, SessionHandle, SessionState},
};

/// Where the console sends the viewer after signing out.
pub const LOGIN_ROUTE: &str = "/login";

/// How long sign-in waits for the session store to resolve the new identity.
const SIGN_IN_SETTLE: Duration = Duration::from_secs(5);

type PageResult<T> = std::result::Result<T, PageError>;

// --- View Structs ---

/// NavLink
///
/// A navigation entry as sent to the front end.
#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct NavLink {
    pub label: String,
    pub route: String,
    pub icon: String,
    pub admin_only: bool,
}

impl From<&NavigationEntry> for NavLink {
    fn from(entry: &NavigationEntry) -> Self {
        Self {
            label: entry.label.to_string(),
            route: entry.route.to_string(),
            icon: entry.icon.to_string(),
            admin_only: entry.admin_only,
        }
    }
}

/// SessionView
///
/// The session snapshot plus the sidebar it unlocks.
#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionView {
    pub state: SessionState,
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub is_admin: bool,
    pub profile_lookup: String,
    pub navigation: Vec<NavLink>,
}

impl SessionView {
    pub fn of(session: &Session) -> Self {
        let navigation = visible_entries(default_navigation(), session.profile.as_ref())
            .into_iter()
            .map(NavLink::from)
            .collect();

        Self {
            state: session.state(),
            identity: session.identity.clone(),
            profile: session.profile.clone(),
            is_admin: session.is_admin(),
            profile_lookup: session.profile_lookup.as_str().to_string(),
            navigation,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct SignOutResponse {
    pub redirect: String,
    // Set when the backend rejected the sign-out; the console is signed out anyway.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct RoutesView {
    pub routes: Vec<RouteView>,
    pub nodes: Vec<Node>,
}

impl From<&RoutesPage> for RoutesView {
    fn from(page: &RoutesPage) -> Self {
        Self {
            routes: page.views(),
            nodes: page.nodes().to_vec(),
        }
    }
}

/// SearchParams
///
/// The search box of the list pages (GET /nodes, /logs, /users).
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SearchParams {
    /// Case-insensitive substring; empty or absent matches everything.
    pub search: Option<String>,
}

impl SearchParams {
    fn term(&self) -> &str {
        self.search.as_deref().unwrap_or("")
    }
}

/// The navigation guard as an HTTP rejection: a 303 to the landing route.
fn require_admin(viewer: &Viewer) -> PageResult<()> {
    let mut target = None;
    if guard_route(Role::Admin, viewer.profile.as_ref(), |to| {
        target = Some(to.to_string())
    }) {
        Ok(())
    } else {
        Err(PageError::Redirect(
            target.unwrap_or_else(|| LANDING_ROUTE.to_string()),
        ))
    }
}

// --- Session & Auth ---

/// get_session
///
/// [Public Route] The current session, including which navigation entries are visible.
#[utoipa::path(
    get,
    path = "/session",
    responses((status = 200, description = "Current session", body = SessionView))
)]
pub async fn get_session(State(session): State<SessionHandle>) -> Json<SessionView> {
    Json(SessionView::of(&session.snapshot()))
}

/// sign_in
///
/// [Public Route] Signs in with email and password. Answers once the session store
/// has resolved the new identity (or after a short grace period).
#[utoipa::path(
    post,
    path = "/auth/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionView),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn sign_in(
    State(session): State<SessionHandle>,
    Json(payload): Json<SignInRequest>,
) -> Result<Json<SessionView>, AppError> {
    let identity = session.sign_in(&payload.email, &payload.password).await?;

    let resolved = session.wait_for(|s| {
        !s.loading && s.identity.as_ref().is_some_and(|i| i.id == identity.id)
    });
    let snapshot = match tokio::time::timeout(SIGN_IN_SETTLE, resolved).await {
        Ok(snapshot) => snapshot,
        Err(_) => {
            tracing::warn!(identity = %identity.id, "session not resolved in time after sign-in");
            session.snapshot()
        }
    };

    Ok(Json(SessionView::of(&snapshot)))
}

/// sign_out
///
/// [Public Route] Signs out. Always answers with the login redirect; a backend
/// failure is reported alongside it.
#[utoipa::path(
    post,
    path = "/auth/sign-out",
    responses((status = 200, description = "Signed out", body = SignOutResponse))
)]
pub async fn sign_out(State(session): State<SessionHandle>) -> Json<SignOutResponse> {
    let error = session.sign_out().await.err().map(|e| e.to_string());
    Json(SignOutResponse {
        redirect: LOGIN_ROUTE.to_string(),
        error,
    })
}

/// refresh_profile
///
/// [Authenticated Route] Looks the signed-in profile up again.
#[utoipa::path(
    post,
    path = "/session/refresh-profile",
    responses((status = 200, description = "Refreshed session", body = SessionView))
)]
pub async fn refresh_profile(
    _viewer: Viewer,
    State(session): State<SessionHandle>,
) -> Json<SessionView> {
    let snapshot = session.refresh_profile().await;
    Json(SessionView::of(&snapshot))
}

// --- Dashboard & Profile ---

#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Dashboard", body = DashboardView),
        (status = 202, description = "Profile not available yet")
    )
)]
pub async fn get_dashboard(
    viewer: Viewer,
    State(data): State<DataServiceState>,
) -> PageResult<Json<DashboardView>> {
    let profile = viewer.profile()?;
    Ok(Json(dashboard::load(data.as_ref(), profile).await?))
}

#[utoipa::path(
    get,
    path = "/profile",
    responses((status = 200, description = "Profile", body = ProfileView))
)]
pub async fn get_profile(viewer: Viewer) -> PageResult<Json<ProfileView>> {
    let profile = viewer.profile()?;
    Ok(Json(ProfileView::new(&viewer.identity, profile, Utc::now())))
}

// --- Nodes ---

#[utoipa::path(
    get,
    path = "/nodes",
    params(SearchParams),
    responses((status = 200, description = "Nodes", body = [NodeView]))
)]
pub async fn get_nodes(
    _viewer: Viewer,
    State(data): State<DataServiceState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<NodeView>>, AppError> {
    let page = NodesPage::load(data.as_ref()).await?;
    Ok(Json(page.search(params.term(), Utc::now())))
}

/// delete_node
///
/// [Authenticated Route] Deletes a node and answers with the remaining ones.
#[utoipa::path(
    delete,
    path = "/nodes/{id}",
    params(("id" = i64, Path, description = "Node ID")),
    responses((status = 200, description = "Remaining nodes", body = [NodeView]))
)]
pub async fn delete_node(
    _viewer: Viewer,
    State(data): State<DataServiceState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<NodeView>>, AppError> {
    let mut page = NodesPage::load(data.as_ref()).await?;
    page.delete(data.as_ref(), id).await?;
    Ok(Json(page.search("", Utc::now())))
}

// --- Routes ---

#[utoipa::path(
    get,
    path = "/routes",
    responses((status = 200, description = "Routes and selectable nodes", body = RoutesView))
)]
pub async fn get_routes(
    _viewer: Viewer,
    State(data): State<DataServiceState>,
) -> Result<Json<RoutesView>, AppError> {
    let page = RoutesPage::load(data.as_ref()).await?;
    Ok(Json(RoutesView::from(&page)))
}

#[utoipa::path(
    post,
    path = "/routes",
    request_body = NewRouteRequest,
    responses(
        (status = 201, description = "Route added (disabled)", body = RoutesView),
        (status = 422, description = "Invalid prefix or node")
    )
)]
pub async fn create_route(
    viewer: Viewer,
    State(data): State<DataServiceState>,
    Json(payload): Json<NewRouteRequest>,
) -> PageResult<impl IntoResponse> {
    let owner = viewer.profile()?.id;
    let mut page = RoutesPage::load(data.as_ref()).await?;
    page.add(data.as_ref(), owner, &payload).await?;
    Ok((StatusCode::CREATED, Json(RoutesView::from(&page))))
}

#[utoipa::path(
    patch,
    path = "/routes/{id}/toggle",
    params(("id" = i64, Path, description = "Route ID")),
    responses((status = 200, description = "Route toggled", body = RoutesView))
)]
pub async fn toggle_route(
    _viewer: Viewer,
    State(data): State<DataServiceState>,
    Path(id): Path<i64>,
) -> Result<Json<RoutesView>, AppError> {
    let mut page = RoutesPage::load(data.as_ref()).await?;
    let enabled = page.toggle(data.as_ref(), id).await?;
    tracing::info!(route_id = id, enabled, "route toggled");
    Ok(Json(RoutesView::from(&page)))
}

#[utoipa::path(
    delete,
    path = "/routes/{id}",
    params(("id" = i64, Path, description = "Route ID")),
    responses((status = 200, description = "Remaining routes", body = RoutesView))
)]
pub async fn delete_route(
    _viewer: Viewer,
    State(data): State<DataServiceState>,
    Path(id): Path<i64>,
) -> Result<Json<RoutesView>, AppError> {
    let mut page = RoutesPage::load(data.as_ref()).await?;
    page.delete(data.as_ref(), id).await?;
    Ok(Json(RoutesView::from(&page)))
}

// --- ACLs ---

#[utoipa::path(
    get,
    path = "/acls",
    responses((status = 200, description = "ACL policies", body = [Acl]))
)]
pub async fn get_acls(
    _viewer: Viewer,
    State(data): State<DataServiceState>,
) -> Result<Json<Vec<Acl>>, AppError> {
    let page = AclsPage::load(data.as_ref()).await?;
    Ok(Json(page.acls().to_vec()))
}

/// get_acl_form
///
/// [Authenticated Route] The edit form of an ACL, rules pretty-printed.
#[utoipa::path(
    get,
    path = "/acls/{id}/form",
    params(("id" = i64, Path, description = "ACL ID")),
    responses((status = 200, description = "Edit form", body = AclForm))
)]
pub async fn get_acl_form(
    _viewer: Viewer,
    State(data): State<DataServiceState>,
    Path(id): Path<i64>,
) -> Result<Json<AclForm>, AppError> {
    let page = AclsPage::load(data.as_ref()).await?;
    Ok(Json(page.edit_form(id)?))
}

#[utoipa::path(
    post,
    path = "/acls",
    request_body = AclForm,
    responses(
        (status = 201, description = "ACL created", body = [Acl]),
        (status = 422, description = "Invalid rules")
    )
)]
pub async fn create_acl(
    viewer: Viewer,
    State(data): State<DataServiceState>,
    Json(form): Json<AclForm>,
) -> PageResult<impl IntoResponse> {
    let owner = viewer.profile()?.id;
    let mut page = AclsPage::load(data.as_ref()).await?;
    page.save(data.as_ref(), owner, None, &form).await?;
    Ok((StatusCode::CREATED, Json(page.acls().to_vec())))
}

#[utoipa::path(
    put,
    path = "/acls/{id}",
    request_body = AclForm,
    params(("id" = i64, Path, description = "ACL ID")),
    responses(
        (status = 200, description = "ACL updated", body = [Acl]),
        (status = 422, description = "Invalid rules")
    )
)]
pub async fn update_acl(
    viewer: Viewer,
    State(data): State<DataServiceState>,
    Path(id): Path<i64>,
    Json(form): Json<AclForm>,
) -> PageResult<Json<Vec<Acl>>> {
    let owner = viewer.profile()?.id;
    let mut page = AclsPage::load(data.as_ref()).await?;
    page.save(data.as_ref(), owner, Some(id), &form).await?;
    Ok(Json(page.acls().to_vec()))
}

#[utoipa::path(
    delete,
    path = "/acls/{id}",
    params(("id" = i64, Path, description = "ACL ID")),
    responses((status = 200, description = "Remaining ACLs", body = [Acl]))
)]
pub async fn delete_acl(
    _viewer: Viewer,
    State(data): State<DataServiceState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Acl>>, AppError> {
    let mut page = AclsPage::load(data.as_ref()).await?;
    page.delete(data.as_ref(), id).await?;
    Ok(Json(page.acls().to_vec()))
}

// --- Pre-auth Keys ---

#[utoipa::path(
    get,
    path = "/preauth-keys",
    responses((status = 200, description = "Pre-auth keys", body = [PreauthKeyView]))
)]
pub async fn get_preauth_keys(
    _viewer: Viewer,
    State(data): State<DataServiceState>,
) -> Result<Json<Vec<PreauthKeyView>>, AppError> {
    let page = PreauthKeysPage::load(data.as_ref()).await?;
    Ok(Json(page.views(Utc::now())))
}

/// create_preauth_key
///
/// [Authenticated Route] Generates a key. The response carries the full key.
#[utoipa::path(
    post,
    path = "/preauth-keys",
    request_body = NewPreauthKeyRequest,
    responses(
        (status = 201, description = "Key created", body = PreauthKeyView),
        (status = 422, description = "Custom expiration missing")
    )
)]
pub async fn create_preauth_key(
    viewer: Viewer,
    State(data): State<DataServiceState>,
    Json(payload): Json<NewPreauthKeyRequest>,
) -> PageResult<impl IntoResponse> {
    let owner = viewer.profile()?.id;
    let now = Utc::now();
    let mut page = PreauthKeysPage::load(data.as_ref()).await?;
    let key = page.create(data.as_ref(), owner, &payload, now).await?;
    let status = key_status(&key, now);
    Ok((StatusCode::CREATED, Json(PreauthKeyView { key, status })))
}

#[utoipa::path(
    delete,
    path = "/preauth-keys/{id}",
    params(("id" = i64, Path, description = "Key ID")),
    responses((status = 200, description = "Remaining keys", body = [PreauthKeyView]))
)]
pub async fn delete_preauth_key(
    _viewer: Viewer,
    State(data): State<DataServiceState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PreauthKeyView>>, AppError> {
    let mut page = PreauthKeysPage::load(data.as_ref()).await?;
    page.delete(data.as_ref(), id).await?;
    Ok(Json(page.views(Utc::now())))
}

// --- Logs ---

#[utoipa::path(
    get,
    path = "/logs",
    params(SearchParams),
    responses((status = 200, description = "Latest activity", body = [LogView]))
)]
pub async fn get_logs(
    _viewer: Viewer,
    State(data): State<DataServiceState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<LogView>>, AppError> {
    let page = LogsPage::load(data.as_ref()).await?;
    Ok(Json(page.search(params.term())))
}

// --- Settings ---

#[utoipa::path(
    get,
    path = "/settings",
    responses((status = 200, description = "Account information", body = AccountInfo))
)]
pub async fn get_settings(viewer: Viewer) -> Json<AccountInfo> {
    Json(AccountInfo::from(&viewer.identity))
}

#[utoipa::path(
    post,
    path = "/settings/password",
    request_body = PasswordChange,
    responses(
        (status = 204, description = "Password updated"),
        (status = 422, description = "Passwords do not match or too short")
    )
)]
pub async fn change_password(
    _viewer: Viewer,
    State(auth): State<AuthServiceState>,
    Json(payload): Json<PasswordChange>,
) -> Result<StatusCode, AppError> {
    settings::change_password(auth.as_ref(), &payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Users (admin) ---

/// get_users
///
/// [Admin Route] Every profile. Non-admins are redirected to the landing route.
#[utoipa::path(
    get,
    path = "/users",
    params(SearchParams),
    responses(
        (status = 200, description = "User profiles", body = [Profile]),
        (status = 303, description = "Not an admin")
    )
)]
pub async fn get_users(
    viewer: Viewer,
    State(data): State<DataServiceState>,
    Query(params): Query<SearchParams>,
) -> PageResult<Json<Vec<Profile>>> {
    require_admin(&viewer)?;
    let page = UsersPage::load(data.as_ref()).await?;
    Ok(Json(page.search(params.term())))
}

#[utoipa::path(
    get,
    path = "/users/{id}/form",
    params(("id" = Uuid, Path, description = "Profile ID")),
    responses((status = 200, description = "Edit form", body = UserUpdate))
)]
pub async fn get_user_form(
    viewer: Viewer,
    State(data): State<DataServiceState>,
    Path(id): Path<Uuid>,
) -> PageResult<Json<UserUpdate>> {
    require_admin(&viewer)?;
    let page = UsersPage::load(data.as_ref()).await?;
    Ok(Json(page.edit_form(id)?))
}

/// update_user
///
/// [Admin Route] Applies the edit form. Editing one's own profile re-resolves the
/// session, so a role change takes effect immediately.
#[utoipa::path(
    put,
    path = "/users/{id}",
    request_body = UserUpdate,
    params(("id" = Uuid, Path, description = "Profile ID")),
    responses(
        (status = 200, description = "User profiles", body = [Profile]),
        (status = 422, description = "Username missing")
    )
)]
pub async fn update_user(
    viewer: Viewer,
    State(session): State<SessionHandle>,
    State(data): State<DataServiceState>,
    Path(id): Path<Uuid>,
    Json(form): Json<UserUpdate>,
) -> PageResult<Json<Vec<Profile>>> {
    require_admin(&viewer)?;
    let mut page = UsersPage::load(data.as_ref()).await?;
    let updated = page.update(data.as_ref(), id, &form).await;

    // Refresh whatever the outcome.
    if id == viewer.identity.id {
        session.refresh_profile().await;
    }
    updated?;
    Ok(Json(page.users().to_vec()))
}

/// [Admin Route] Deletes a profile. Deleting one's own re-resolves the session.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "Profile ID")),
    responses((status = 200, description = "Remaining profiles", body = [Profile]))
)]
pub async fn delete_user(
    viewer: Viewer,
    State(session): State<SessionHandle>,
    State(data): State<DataServiceState>,
    Path(id): Path<Uuid>,
) -> PageResult<Json<Vec<Profile>>> {
    require_admin(&viewer)?;
    let mut page = UsersPage::load(data.as_ref()).await?;
    let deleted = page.delete(data.as_ref(), id).await;

    if id == viewer.identity.id {
        session.refresh_profile().await;
    }
    deleted?;
    Ok(Json(page.users().to_vec()))
}
