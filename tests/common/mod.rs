#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use headscale_admin::{
    AppConfig, AppState, MockBackend,
    auth::Identity,
    data_service::Table,
    session::{Session, SessionHandle, SessionState},
};
use serde_json::{Value, json};
use uuid::Uuid;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const USER_EMAIL: &str = "user@example.com";
// Signs in fine but has no profile row.
pub const ORPHAN_EMAIL: &str = "orphan@example.com";
pub const PASSWORD: &str = "correct-horse";

pub const CREATED_AT: &str = "2024-01-01T00:00:00Z";

pub fn identity(n: u128, email: &str) -> Identity {
    Identity {
        id: Uuid::from_u128(n),
        email: Some(email.to_string()),
        ..Identity::default()
    }
}

pub fn admin_identity() -> Identity {
    identity(1, ADMIN_EMAIL)
}

pub fn user_identity() -> Identity {
    identity(2, USER_EMAIL)
}

pub fn orphan_identity() -> Identity {
    identity(3, ORPHAN_EMAIL)
}

pub fn profile_row(identity: &Identity, username: &str, role: &str) -> Value {
    json!({
        "id": identity.id,
        "username": username,
        "role": role,
        "expiration_date": null,
        "traffic_limit": 0,
        "traffic_used": 0,
        "is_active": true,
        "created_at": CREATED_AT,
        "updated_at": CREATED_AT,
    })
}

/// A backend with three accounts: an admin, a plain user, and an identity whose
/// profile row does not exist.
pub fn backend() -> Arc<MockBackend> {
    let backend = MockBackend::new()
        .with_account(ADMIN_EMAIL, PASSWORD, admin_identity())
        .with_account(USER_EMAIL, PASSWORD, user_identity())
        .with_account(ORPHAN_EMAIL, PASSWORD, orphan_identity());

    backend.seed(
        Table::UserProfiles,
        [
            profile_row(&admin_identity(), "admin", "admin"),
            profile_row(&user_identity(), "alice", "user"),
        ],
    );
    Arc::new(backend)
}

pub fn node_row(id: i64, owner: &Identity, name: &str, ip: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "user_id": owner.id,
        "node_name": name,
        "ip_address": ip,
        "last_seen": null,
        "created_at": created_at,
        "updated_at": created_at,
    })
}

pub fn state_for(backend: &Arc<MockBackend>) -> AppState {
    AppState::new(backend.clone(), AppConfig::default())
}

/// An initialized state over `backend`.
pub async fn started_state(backend: &Arc<MockBackend>) -> AppState {
    let state = state_for(backend);
    state
        .session
        .initialize()
        .await
        .expect("session store initializes once");
    state
}

/// Waits (bounded) until the store has resolved `identity`.
pub async fn settle_on(store: &SessionHandle, identity: &Identity) -> Arc<Session> {
    let id = identity.id;
    tokio::time::timeout(
        Duration::from_secs(5),
        store.wait_for(move |s| !s.loading && s.identity.as_ref().is_some_and(|i| i.id == id)),
    )
    .await
    .expect("session resolved in time")
}

pub async fn settle_anonymous(store: &SessionHandle) -> Arc<Session> {
    tokio::time::timeout(
        Duration::from_secs(5),
        store.wait_for(|s| s.state() == SessionState::Anonymous),
    )
    .await
    .expect("session became anonymous in time")
}

/// Signs in through the store and waits for the resolution.
pub async fn signed_in(backend: &Arc<MockBackend>, email: &str) -> AppState {
    let state = started_state(backend).await;
    let identity = state
        .session
        .sign_in(email, PASSWORD)
        .await
        .expect("known account signs in");
    settle_on(&state.session, &identity).await;
    state
}
