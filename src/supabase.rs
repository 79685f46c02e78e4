use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, RequestBuilder, Response, StatusCode, header};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::{
    auth::{
        AUTH_EVENT_CAPACITY, AuthEvent, AuthEventKind, AuthService, AuthSession, AuthSubscription,
        CredentialsPatch, Identity,
    },
    config::AppConfig,
    data_service::{DataService, Query, RowId, Table},
    error::{AppError, Result},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Token endpoint response shared by the password and refresh grants.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: Identity,
}

impl From<TokenResponse> for AuthSession {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token
            .expires_at
            .or_else(|| token.expires_in.map(|secs| Utc::now().timestamp() + secs));
        AuthSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user,
        }
    }
}

/// SupabaseClient
///
/// The concrete backend client: PostgREST (`/rest/v1`) for tables and GoTrue
/// (`/auth/v1`) for auth. Holds the one auth session of the process and broadcasts
/// every change of it.
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: RwLock<Option<AuthSession>>,
    // Serializes token refreshes so concurrent readers refresh once.
    refresh_lock: Mutex<()>,
    events: broadcast::Sender<AuthEvent>,
    session_file: Option<PathBuf>,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("headscale-admin/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);

        Ok(Self {
            http,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            session: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            events,
            session_file: config.session_file.clone(),
        })
    }

    /// restore_session
    ///
    /// Loads the session persisted by a previous run, if a session file is configured
    /// and present. No event is emitted: the session store picks the session up
    /// through `get_session` when it initializes.
    pub async fn restore_session(&self) -> Result<bool> {
        let Some(path) = &self.session_file else {
            return Ok(false);
        };

        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let session: AuthSession = serde_json::from_slice(&raw)?;
        info!(identity = %session.user.id, "restored persisted auth session");
        *self.session.write().await = Some(session);
        Ok(true)
    }

    fn emit(&self, kind: AuthEventKind, session: Option<AuthSession>) {
        // No subscribers is fine; nobody is listening yet.
        let _ = self.events.send(AuthEvent { kind, session });
    }

    async fn store_session(&self, session: Option<AuthSession>) {
        if let Some(path) = &self.session_file {
            let persisted = match &session {
                Some(session) => match serde_json::to_vec(session) {
                    Ok(raw) => tokio::fs::write(path, raw).await,
                    Err(e) => Err(std::io::Error::other(e)),
                },
                None => match tokio::fs::remove_file(path).await {
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    other => other,
                },
            };
            if let Err(e) = persisted {
                warn!(path = %path.display(), error = %e, "could not persist auth session");
            }
        }
        *self.session.write().await = session;
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    fn rest_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    /// The bearer token for table requests: the session's access token, or the
    /// anon key when signed out. A refresh that fails for any reason other than a
    /// rejected refresh token is returned, not retried as anon.
    async fn bearer(&self) -> Result<String> {
        Ok(match self.get_session().await? {
            Some(session) => session.access_token,
            None => self.anon_key.clone(),
        })
    }

    async fn rest(&self, method: Method, table: Table) -> Result<RequestBuilder> {
        let token = self.bearer().await?;
        Ok(self
            .http
            .request(method, self.rest_url(table))
            .header("apikey", &self.anon_key)
            .bearer_auth(token))
    }

    async fn token_request(&self, grant_type: &str, body: Value) -> Result<AuthSession> {
        let response = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;

        let response = check_auth(response).await?;
        let token: TokenResponse = response.json().await?;
        Ok(token.into())
    }
}

/// Turns a non-success response into an `AppError`, using the backend's message.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::from_status(status, error_message(&body)))
}

/// Like `check`, but every client error of the auth API is an authentication failure.
async fn check_auth(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_client_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::Auth(error_message(&body)));
    }
    check(response).await
}

/// Extracts the human-readable message from a GoTrue or PostgREST error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| value.get(key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Reads the total from a `Content-Range` header such as `0-24/25` or `*/0`.
fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.parse().ok()
}

#[async_trait]
impl AuthService for SupabaseClient {
    async fn get_session(&self) -> Result<Option<AuthSession>> {
        let current = self.session.read().await.clone();
        match current {
            None => return Ok(None),
            Some(session) if !session.is_expired(Utc::now()) => return Ok(Some(session)),
            Some(_) => {}
        }

        let _refreshing = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        let Some(current) = self.session.read().await.clone() else {
            return Ok(None);
        };
        if !current.is_expired(Utc::now()) {
            return Ok(Some(current));
        }

        debug!(identity = %current.user.id, "access token expired, refreshing");
        let refreshed = self
            .token_request(
                "refresh_token",
                json!({ "refresh_token": current.refresh_token }),
            )
            .await;

        match refreshed {
            Ok(session) => {
                self.store_session(Some(session.clone())).await;
                self.emit(AuthEventKind::TokenRefreshed, Some(session.clone()));
                Ok(Some(session))
            }
            Err(e) if e.is_auth() => {
                warn!(error = %e, "refresh token rejected, signing out");
                self.store_session(None).await;
                self.emit(AuthEventKind::SignedOut, None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let session = self
            .token_request("password", json!({ "email": email, "password": password }))
            .await?;

        self.store_session(Some(session.clone())).await;
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone());

        let remote = match token {
            Some(token) => {
                let sent = self
                    .http
                    .post(self.auth_url("logout"))
                    .header("apikey", &self.anon_key)
                    .bearer_auth(token)
                    .send()
                    .await;
                match sent {
                    Ok(response) => check(response).await.map(|_| ()),
                    Err(e) => Err(e.into()),
                }
            }
            None => Ok(()),
        };

        self.store_session(None).await;
        self.emit(AuthEventKind::SignedOut, None);
        remote
    }

    async fn update_credentials(&self, patch: CredentialsPatch) -> Result<Identity> {
        let session = self
            .get_session()
            .await?
            .ok_or_else(|| AppError::Auth("not signed in".to_string()))?;

        let response = self
            .http
            .put(self.auth_url("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .json(&patch)
            .send()
            .await?;
        let user: Identity = check_auth(response).await?.json().await?;

        let updated = AuthSession {
            user: user.clone(),
            ..session
        };
        self.store_session(Some(updated.clone())).await;
        self.emit(AuthEventKind::UserUpdated, Some(updated));
        Ok(user)
    }
}

#[async_trait]
impl DataService for SupabaseClient {
    async fn select(&self, table: Table, query: Query) -> Result<Vec<Value>> {
        let response = self
            .rest(Method::GET, table)
            .await?
            .query(&[("select", "*")])
            .query(&query.to_params())
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn count(&self, table: Table, query: Query) -> Result<u64> {
        let filters = Query {
            filters: query.filters,
            ..Query::default()
        };
        let response = self
            .rest(Method::HEAD, table)
            .await?
            .query(&[("select", "*")])
            .query(&filters.to_params())
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = check(response).await?;

        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| AppError::Service {
                status: StatusCode::OK.as_u16(),
                message: format!("count of {table} returned no Content-Range"),
            })
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value> {
        let response = self
            .rest(Method::POST, table)
            .await?
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        let rows: Vec<Value> = check(response).await?.json().await?;
        rows.into_iter().next().ok_or_else(|| AppError::Service {
            status: StatusCode::OK.as_u16(),
            message: format!("insert into {table} returned no row"),
        })
    }

    async fn update(&self, table: Table, id: RowId, patch: Value) -> Result<Value> {
        let response = self
            .rest(Method::PATCH, table)
            .await?
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        let rows: Vec<Value> = check(response).await?.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("{table} row {id}")))
    }

    async fn delete(&self, table: Table, id: RowId) -> Result<()> {
        let response = self
            .rest(Method::DELETE, table)
            .await?
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}
