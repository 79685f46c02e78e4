mod common;

use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{Request, StatusCode, header},
    response::{IntoResponse, Response},
};
use common::*;
use headscale_admin::{
    AppError, AppState, PageError,
    auth::Viewer,
    create_router,
    data_service::Table,
    handlers::{self, LOGIN_ROUTE, SearchParams},
    models::{NewRouteRequest, PasswordChange, Role, SignInRequest, UserUpdate},
    pages::preauth_keys::NewPreauthKeyRequest,
    session::{ProfileLookup, SessionState},
};
use serde_json::{Value, json};
use tokio::test;
use tower::ServiceExt;

// --- Helpers ---

/// The viewer the extractor would build from the current snapshot.
fn viewer_of(state: &AppState) -> Viewer {
    let session = state.session.snapshot();
    Viewer {
        identity: session.identity.clone().expect("signed in"),
        profile: session.profile.clone(),
    }
}

async fn body_json(response: Response) -> Value {
    let (_parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    create_router(state.clone()).oneshot(request).await.unwrap()
}

// --- Session & Auth handlers ---

#[test]
async fn test_get_session_anonymous() {
    let backend = backend();
    let state = started_state(&backend).await;

    let Json(view) = handlers::get_session(State(state.session.clone())).await;

    assert_eq!(view.state, SessionState::Anonymous);
    assert!(!view.is_admin);
    assert_eq!(view.profile_lookup, "not_attempted");
    assert!(view.navigation.iter().all(|link| !link.admin_only));
    state.session.shutdown().await;
}

#[test]
async fn test_sign_in_answers_with_resolved_session() {
    let backend = backend();
    let state = started_state(&backend).await;

    let payload = SignInRequest {
        email: ADMIN_EMAIL.to_string(),
        password: PASSWORD.to_string(),
    };
    let Json(view) = handlers::sign_in(State(state.session.clone()), Json(payload))
        .await
        .unwrap();

    assert_eq!(view.state, SessionState::Authenticated);
    assert!(view.is_admin);
    assert!(view.navigation.iter().any(|link| link.route == "/users"));
    state.session.shutdown().await;
}

#[test]
async fn test_sign_in_with_wrong_password() {
    let backend = backend();
    let state = started_state(&backend).await;

    let payload = SignInRequest {
        email: USER_EMAIL.to_string(),
        password: "nope".to_string(),
    };
    let result = handlers::sign_in(State(state.session.clone()), Json(payload)).await;

    let err = result.unwrap_err();
    assert!(matches!(err, AppError::Auth(_)));
    assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    state.session.shutdown().await;
}

#[test]
async fn test_sign_out_reports_backend_failure_but_redirects() {
    let backend = backend();
    backend.set_fail_sign_out(true);
    let state = signed_in(&backend, USER_EMAIL).await;

    let Json(response) = handlers::sign_out(State(state.session.clone())).await;

    assert_eq!(response.redirect, LOGIN_ROUTE);
    assert!(response.error.is_some());
    settle_anonymous(&state.session).await;
    state.session.shutdown().await;
}

// --- Page handlers ---

#[test]
async fn test_dashboard_awaits_missing_profile() {
    let backend = backend();
    let state = signed_in(&backend, ORPHAN_EMAIL).await;

    let result = handlers::get_dashboard(viewer_of(&state), State(state.data.clone())).await;

    assert!(matches!(result, Err(PageError::AwaitingProfile)));
    state.session.shutdown().await;
}

#[test]
async fn test_get_users_redirects_non_admin() {
    let backend = backend();
    let state = signed_in(&backend, USER_EMAIL).await;

    let result = handlers::get_users(
        viewer_of(&state),
        State(state.data.clone()),
        Query(SearchParams::default()),
    )
    .await;

    assert!(matches!(result, Err(PageError::Redirect(ref to)) if to == "/dashboard"));
    state.session.shutdown().await;
}

#[test]
async fn test_get_users_for_admin() {
    let backend = backend();
    let state = signed_in(&backend, ADMIN_EMAIL).await;

    let Json(users) = handlers::get_users(
        viewer_of(&state),
        State(state.data.clone()),
        Query(SearchParams {
            search: Some("alice".to_string()),
        }),
    )
    .await
    .unwrap();

    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "alice");
    state.session.shutdown().await;
}

#[test]
async fn test_create_route_rejects_bad_prefix() {
    let backend = backend();
    let state = signed_in(&backend, USER_EMAIL).await;
    backend.seed(
        Table::Nodes,
        [node_row(1, &user_identity(), "laptop", "100.64.0.2", CREATED_AT)],
    );

    let payload = NewRouteRequest {
        node_id: 1,
        route: "not-a-prefix".to_string(),
    };
    let response = handlers::create_route(viewer_of(&state), State(state.data.clone()), Json(payload))
        .await
        .into_response();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("not-a-prefix"));
    assert!(backend.rows(Table::Routes).is_empty());
    state.session.shutdown().await;
}

#[test]
async fn test_create_preauth_key_returns_created_key() {
    let backend = backend();
    let state = signed_in(&backend, USER_EMAIL).await;

    let response = handlers::create_preauth_key(
        viewer_of(&state),
        State(state.data.clone()),
        Json(NewPreauthKeyRequest::default()),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert!(body["key"]["key"].as_str().unwrap().starts_with("hskey-"));
    assert_eq!(body["status"], "Active");
    state.session.shutdown().await;
}

#[test]
async fn test_change_password_handler() {
    let backend = backend();
    let state = signed_in(&backend, USER_EMAIL).await;

    let mismatch = handlers::change_password(
        viewer_of(&state),
        State(state.auth.clone()),
        Json(PasswordChange {
            new_password: "abcdef".to_string(),
            confirm_password: "abcdeg".to_string(),
        }),
    )
    .await;
    assert!(matches!(mismatch, Err(AppError::Validation(_))));

    let status = handlers::change_password(
        viewer_of(&state),
        State(state.auth.clone()),
        Json(PasswordChange {
            new_password: "abcdef".to_string(),
            confirm_password: "abcdef".to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);
    state.session.shutdown().await;
}

#[test]
async fn test_self_demotion_takes_effect_on_next_request() {
    let backend = backend();
    let state = signed_in(&backend, ADMIN_EMAIL).await;
    let admin = viewer_of(&state);

    let form = UserUpdate {
        username: "admin".to_string(),
        role: Role::User,
        is_active: true,
        traffic_limit: 0,
        expiration_date: None,
    };
    handlers::update_user(
        admin.clone(),
        State(state.session.clone()),
        State(state.data.clone()),
        Path(admin.identity.id),
        Json(form),
    )
    .await
    .unwrap();

    assert!(!state.session.is_admin());
    let response = send(&state, "GET", "/users", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/dashboard");
    state.session.shutdown().await;
}

#[test]
async fn test_self_deletion_drops_admin_rights() {
    let backend = backend();
    let state = signed_in(&backend, ADMIN_EMAIL).await;
    let admin = viewer_of(&state);

    let Json(remaining) = handlers::delete_user(
        admin.clone(),
        State(state.session.clone()),
        State(state.data.clone()),
        Path(admin.identity.id),
    )
    .await
    .unwrap();

    assert_eq!(remaining.len(), 1);
    let session = state.session.snapshot();
    assert_eq!(session.profile_lookup, ProfileLookup::Missing);
    assert!(!state.session.is_admin());
    let response = send(&state, "GET", "/users", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    state.session.shutdown().await;
}

#[test]
async fn test_deleting_another_user_keeps_the_session() {
    let backend = backend();
    let state = signed_in(&backend, ADMIN_EMAIL).await;
    let revision = state.session.snapshot().revision;

    handlers::delete_user(
        viewer_of(&state),
        State(state.session.clone()),
        State(state.data.clone()),
        Path(user_identity().id),
    )
    .await
    .unwrap();

    assert_eq!(state.session.snapshot().revision, revision);
    assert!(state.session.is_admin());
    state.session.shutdown().await;
}

// --- Router gating ---

#[test]
async fn test_pages_answer_loading_before_resolution() {
    let backend = backend();
    let state = state_for(&backend);

    let health = send(&state, "GET", "/health", None).await;
    assert_eq!(health.status(), StatusCode::OK);

    let response = send(&state, "GET", "/dashboard", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await, json!({ "status": "loading" }));
}

#[test]
async fn test_anonymous_requests_are_unauthorized() {
    let backend = backend();
    let state = started_state(&backend).await;

    let nodes = send(&state, "GET", "/nodes", None).await;
    assert_eq!(nodes.status(), StatusCode::UNAUTHORIZED);

    let users = send(&state, "GET", "/users", None).await;
    assert_eq!(users.status(), StatusCode::UNAUTHORIZED);
    state.session.shutdown().await;
}

#[test]
async fn test_orphan_identity_gets_neutral_dashboard() {
    let backend = backend();
    let state = signed_in(&backend, ORPHAN_EMAIL).await;

    let response = send(&state, "GET", "/dashboard", None).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let users = send(&state, "GET", "/users", None).await;
    assert_eq!(users.status(), StatusCode::SEE_OTHER);
    state.session.shutdown().await;
}

#[test]
async fn test_sign_in_over_http_unlocks_admin_routes() {
    let backend = backend();
    let state = started_state(&backend).await;

    let sign_in = send(
        &state,
        "POST",
        "/auth/sign-in",
        Some(json!({ "email": ADMIN_EMAIL, "password": PASSWORD })),
    )
    .await;
    assert_eq!(sign_in.status(), StatusCode::OK);
    assert_eq!(body_json(sign_in).await["state"], "authenticated");

    let users = send(&state, "GET", "/users", None).await;
    assert_eq!(users.status(), StatusCode::OK);
    assert_eq!(body_json(users).await.as_array().map(Vec::len), Some(2));

    let sign_out = send(&state, "POST", "/auth/sign-out", None).await;
    assert_eq!(body_json(sign_out).await["redirect"], LOGIN_ROUTE);
    settle_anonymous(&state.session).await;

    let after = send(&state, "GET", "/users", None).await;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
    state.session.shutdown().await;
}
