mod common;

use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, request::Parts},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use common::*;
use headscale_admin::{
    MockBackend, PageError,
    auth::{AuthSession, Viewer, decode_claims},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;

/// Helper to get the mutable Parts struct from a generated Request
fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn token_expiring_at(exp: i64) -> String {
    let claims = json!({ "sub": admin_identity().id, "exp": exp, "email": ADMIN_EMAIL });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"backend-only-secret"),
    )
    .unwrap()
}

// --- Viewer extractor ---

#[tokio::test]
async fn test_viewer_rejected_while_loading() {
    let backend = backend();
    let app_state = state_for(&backend);

    let mut parts = get_request_parts(Method::GET, "/dashboard".parse().unwrap());
    let viewer = Viewer::from_request_parts(&mut parts, &app_state).await;

    let rejection = viewer.unwrap_err();
    assert!(matches!(rejection, PageError::Loading));
    assert_eq!(
        rejection.into_response().status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_viewer_rejected_when_anonymous() {
    let backend = backend();
    let app_state = started_state(&backend).await;

    let mut parts = get_request_parts(Method::GET, "/nodes".parse().unwrap());
    let viewer = Viewer::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(
        viewer.unwrap_err().into_response().status(),
        StatusCode::UNAUTHORIZED
    );
    app_state.session.shutdown().await;
}

#[tokio::test]
async fn test_viewer_carries_identity_and_profile() {
    let backend = backend();
    let app_state = signed_in(&backend, ADMIN_EMAIL).await;

    let mut parts = get_request_parts(Method::GET, "/users".parse().unwrap());
    let viewer = Viewer::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();

    assert_eq!(viewer.identity.id, admin_identity().id);
    assert!(viewer.is_admin());
    assert_eq!(viewer.profile().unwrap().username, "admin");
    app_state.session.shutdown().await;
}

#[tokio::test]
async fn test_viewer_without_profile_is_let_through() {
    let backend = backend();
    let app_state = signed_in(&backend, ORPHAN_EMAIL).await;

    let mut parts = get_request_parts(Method::GET, "/dashboard".parse().unwrap());
    let viewer = Viewer::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();

    assert!(!viewer.is_admin());
    assert!(matches!(viewer.profile(), Err(PageError::AwaitingProfile)));
    app_state.session.shutdown().await;
}

// --- Token expiry ---

#[test]
fn test_claims_read_without_signature_check() {
    let exp = Utc::now().timestamp() + 3600;
    let claims = decode_claims(&token_expiring_at(exp)).unwrap();

    assert_eq!(claims.sub, admin_identity().id);
    assert_eq!(claims.exp as i64, exp);
    assert_eq!(claims.email.as_deref(), Some(ADMIN_EMAIL));
}

#[test]
fn test_malformed_token_is_a_token_error() {
    assert!(decode_claims("not-a-jwt").is_err());
}

#[test]
fn test_session_expiry_falls_back_to_token_claim() {
    let now = Utc::now();
    let fresh = AuthSession {
        access_token: token_expiring_at((now + Duration::hours(1)).timestamp()),
        ..MockBackend::session_for(&admin_identity())
    };
    // Inside the refresh margin.
    let nearly_expired = AuthSession {
        access_token: token_expiring_at((now + Duration::seconds(10)).timestamp()),
        ..MockBackend::session_for(&admin_identity())
    };

    assert!(!fresh.is_expired(now));
    assert!(nearly_expired.is_expired(now));
}

#[test]
fn test_explicit_expiry_wins_and_opaque_tokens_never_expire() {
    let now = Utc::now();
    let explicit = AuthSession {
        expires_at: Some((now - Duration::minutes(1)).timestamp()),
        ..MockBackend::session_for(&admin_identity())
    };
    let opaque = MockBackend::session_for(&admin_identity());

    assert!(explicit.is_expired(now));
    assert!(!opaque.is_expired(now));
}
