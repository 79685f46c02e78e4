use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{AppError, PageError, Result},
    models::Profile,
    session::SessionHandle,
};

/// Access tokens this close to expiry are treated as expired.
pub const EXPIRY_MARGIN_SECS: i64 = 30;

/// Claims
///
/// The subset of the access token payload the console inspects. The signature is
/// never verified locally: the backend does that on every request, the console
/// only needs `exp` to know when to refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the identity id, also the primary key of the profile row.
    pub sub: Uuid,
    /// Expiration Time (exp), unix seconds.
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// decode_claims
///
/// Reads the claims of `token` without checking its signature or expiry.
pub fn decode_claims(token: &str) -> Result<Claims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

/// Identity
///
/// The authenticated principal as reported by the auth service. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Identity {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

/// AuthSession
///
/// Tokens plus the identity they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds. When absent the access token's `exp` claim is used.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: Identity,
}

impl AuthSession {
    pub fn expires_at(&self) -> Option<i64> {
        self.expires_at.or_else(|| {
            decode_claims(&self.access_token)
                .ok()
                .map(|claims| claims.exp as i64)
        })
    }

    /// True when the access token is expired or about to be. Sessions without a
    /// known expiry never expire locally.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at()
            .is_some_and(|exp| exp <= now.timestamp() + EXPIRY_MARGIN_SECS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// AuthEvent
///
/// One auth-state change, carrying the session as it is after the change.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<AuthSession>,
}

impl AuthEvent {
    pub fn signed_in(session: AuthSession) -> Self {
        Self {
            kind: AuthEventKind::SignedIn,
            session: Some(session),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: AuthEventKind::SignedOut,
            session: None,
        }
    }
}

/// CredentialsPatch
///
/// Fields of the signed-in identity to change; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CredentialsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Receiving end of the auth event stream. Dropping it unsubscribes.
pub type AuthSubscription = broadcast::Receiver<AuthEvent>;

/// Capacity of the auth event channel; slower subscribers resynchronise.
pub const AUTH_EVENT_CAPACITY: usize = 16;

/// AuthService Trait
///
/// The auth half of the hosted backend.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// The current session, refreshed first if its access token has expired.
    async fn get_session(&self) -> Result<Option<AuthSession>>;

    /// Subscribes to auth-state changes for as long as the receiver lives.
    fn subscribe(&self) -> AuthSubscription;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession>;

    /// Signs out. The local session is always cleared and `SignedOut` emitted, even
    /// when the remote call fails; the remote failure is still returned.
    async fn sign_out(&self) -> Result<()>;

    async fn update_credentials(&self, patch: CredentialsPatch) -> Result<Identity>;
}

pub type AuthServiceState = Arc<dyn AuthService>;

/// Viewer
///
/// The resolved viewer of a page: a signed-in identity and, when available, its
/// profile. Read from a fresh session snapshot on every request, so a role change
/// published by the session store applies to the very next request.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub identity: Identity,
    pub profile: Option<Profile>,
}

impl Viewer {
    /// The profile, or the neutral "awaiting profile" view when there is none.
    pub fn profile(&self) -> std::result::Result<&Profile, PageError> {
        self.profile.as_ref().ok_or(PageError::AwaitingProfile)
    }

    pub fn is_admin(&self) -> bool {
        self.profile.as_ref().is_some_and(Profile::is_admin)
    }
}

/// Viewer Extractor Implementation
///
/// Rejects while the session is still loading (503) and when nobody is signed in
/// (401). A signed-in identity without a profile is let through; pages decide how
/// to render it.
impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
    SessionHandle: FromRef<S>,
{
    type Rejection = PageError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let session = SessionHandle::from_ref(state).snapshot();

        if session.loading {
            return Err(PageError::Loading);
        }

        let identity = session
            .identity
            .clone()
            .ok_or_else(|| AppError::Auth("not signed in".to_string()))?;

        Ok(Viewer {
            identity,
            profile: session.profile.clone(),
        })
    }
}
