//! Session/role resolution.
//!
//! One [`SessionStore`] exists per process. It owns the only long-lived background
//! task of the console: a listener on the auth event stream that re-resolves the
//! signed-in identity and its profile after every sign-in, sign-out and token
//! refresh. Readers never see a half-built session: every resolution produces a
//! whole [`Session`] which is published as a new `Arc` snapshot.
//!
//! Ordering: every resolution is stamped with a revision taken when it is issued,
//! and a result is published only if its revision is newer than the one already
//! published. A slow resolution can therefore never overwrite the result of an
//! auth event that arrived after it, whichever finishes first.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    auth::{AuthEvent, AuthServiceState, AuthSubscription, Identity},
    data_service::{DataServiceState, Query, Table, fetch_optional},
    error::{AppError, Result},
    models::{Profile, Role},
};

/// How the profile of the current identity was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileLookup {
    NotAttempted,
    Found,
    /// The backend answered, but there is no row (e.g. signup still provisioning).
    Missing,
    /// The lookup itself failed; `refresh_profile` is the retry path.
    Failed(String),
}

impl ProfileLookup {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileLookup::NotAttempted => "not_attempted",
            ProfileLookup::Found => "found",
            ProfileLookup::Missing => "missing",
            ProfileLookup::Failed(_) => "failed",
        }
    }
}

/// Coarse state of a session, as shown to the console's front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SessionState {
    Loading,
    Anonymous,
    /// Signed in, but not yet authorized for role-gated content.
    AwaitingProfile,
    Authenticated,
}

/// Session
///
/// Identity + profile + loading flag, as of one resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub loading: bool,
    pub profile_lookup: ProfileLookup,
    /// Revision of the resolution that produced this snapshot; 0 before the first.
    pub revision: u64,
}

impl Session {
    pub fn loading() -> Self {
        Self {
            identity: None,
            profile: None,
            loading: true,
            profile_lookup: ProfileLookup::NotAttempted,
            revision: 0,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            loading: false,
            ..Self::loading()
        }
    }

    pub fn state(&self) -> SessionState {
        match (self.loading, &self.identity, &self.profile) {
            (true, _, _) => SessionState::Loading,
            (false, None, _) => SessionState::Anonymous,
            (false, Some(_), None) => SessionState::AwaitingProfile,
            (false, Some(_), Some(_)) => SessionState::Authenticated,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.profile.as_ref().map(|p| p.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Some(Role::Admin)
    }
}

/// What a listener iteration resolves from.
enum Trigger {
    Event(AuthEvent),
    /// Events were lost; read the session from the auth service again.
    Resync,
}

enum Step {
    Done(Session),
    Superseded(Option<Trigger>),
    Shutdown,
}

/// SessionStore
///
/// The process-wide source of truth for "who is signed in and what may they do".
/// Shared through `AppState` as a [`SessionHandle`].
pub struct SessionStore {
    auth: AuthServiceState,
    data: DataServiceState,
    state_tx: watch::Sender<Arc<Session>>,
    issued: AtomicU64,
    initialized: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

pub type SessionHandle = Arc<SessionStore>;

impl SessionStore {
    /// Creates the store in the `loading` state. Nothing is resolved until
    /// `initialize` runs.
    pub fn new(auth: AuthServiceState, data: DataServiceState) -> SessionHandle {
        let (state_tx, _) = watch::channel(Arc::new(Session::loading()));
        let (shutdown_tx, _) = broadcast::channel(1);

        Arc::new(Self {
            auth,
            data,
            state_tx,
            issued: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
            shutdown_tx,
            listener: Mutex::new(None),
        })
    }

    /// The current session. Each call returns an immutable snapshot.
    pub fn snapshot(&self) -> Arc<Session> {
        self.state_tx.borrow().clone()
    }

    pub fn is_admin(&self) -> bool {
        self.snapshot().is_admin()
    }

    /// Subscribes to published sessions.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Session>> {
        self.state_tx.subscribe()
    }

    /// Waits until a published session satisfies `predicate` and returns it.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&Session) -> bool) -> Arc<Session> {
        let mut rx = self.state_tx.subscribe();
        match rx.wait_for(|session| predicate(session)).await {
            Ok(session) => session.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// initialize
    ///
    /// Resolves the session the auth service already holds (if any), publishes it,
    /// and starts the auth event listener. Subscribes before reading the current
    /// session so no event between the two is lost. May run once per store.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(AppError::AlreadyInitialized);
        }

        let events = self.auth.subscribe();
        let shutdown_rx = self.shutdown_tx.subscribe();

        let revision = self.next_revision();
        let identity = self.current_identity().await;
        let session = self.resolve(identity).await;
        info!(state = ?session.state(), "session initialized");
        self.publish(revision, session);

        let store = Arc::clone(self);
        let handle = tokio::spawn(async move { store.listen(events, shutdown_rx).await });
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        Ok(())
    }

    /// sign_in
    ///
    /// Delegates to the auth service and returns the signed-in identity. The
    /// resulting `SignedIn` event drives resolution; nothing is resolved here so the
    /// profile is fetched once.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        match self.auth.sign_in(email, password).await {
            Ok(session) => {
                info!(identity = %session.user.id, "sign-in accepted");
                Ok(session.user)
            }
            Err(e) => {
                warn!(error = %e, "sign-in rejected");
                Err(e)
            }
        }
    }

    /// sign_out
    ///
    /// Delegates to the auth service. Failures are returned for the caller to
    /// surface; the auth service clears its local session regardless, so the
    /// `SignedOut` event still resets this store.
    pub async fn sign_out(&self) -> Result<()> {
        self.auth.sign_out().await.inspect_err(|e| {
            error!(error = %e, "sign-out failed on the backend");
        })
    }

    /// refresh_profile
    ///
    /// Looks the profile of the current identity up again and publishes the result,
    /// unless an auth event overtook it in the meantime. The identity is read from
    /// the auth service after the revision is taken, so an event still resolving
    /// cannot leave the refresh holding the identity it replaced.
    pub async fn refresh_profile(&self) -> Arc<Session> {
        let revision = self.next_revision();
        let identity = match self.auth.get_session().await {
            Ok(session) => session.map(|s| s.user),
            Err(e) => {
                warn!(error = %e, "could not read the auth session, keeping the current one");
                return self.snapshot();
            }
        };
        let session = self.resolve(identity).await;
        self.publish(revision, session);
        self.snapshot()
    }

    /// shutdown
    ///
    /// Stops the auth event listener and waits for it to exit. The auth
    /// subscription is dropped with the listener.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "session listener ended abnormally");
            }
        }
    }

    // --- internals ---

    fn next_revision(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Publishes `session` under `revision` unless a newer revision is already out.
    fn publish(&self, revision: u64, mut session: Session) -> bool {
        session.revision = revision;
        let next = Arc::new(session);

        self.state_tx.send_if_modified(move |current| {
            if revision <= current.revision {
                debug!(
                    revision,
                    current = current.revision,
                    "discarding stale session resolution"
                );
                return false;
            }
            *current = next;
            true
        })
    }

    async fn current_identity(&self) -> Option<Identity> {
        match self.auth.get_session().await {
            Ok(session) => session.map(|s| s.user),
            Err(e) => {
                warn!(error = %e, "could not read the current auth session");
                None
            }
        }
    }

    /// Builds the session for `identity`. A failed or empty profile lookup yields
    /// an identity without profile, never an error.
    async fn resolve(&self, identity: Option<Identity>) -> Session {
        let Some(identity) = identity else {
            return Session::anonymous();
        };

        let query = Query::new().eq("id", identity.id);
        let (profile, profile_lookup) =
            match fetch_optional::<Profile>(self.data.as_ref(), Table::UserProfiles, query).await {
                Ok(Some(profile)) => (Some(profile), ProfileLookup::Found),
                Ok(None) => {
                    warn!(identity = %identity.id, "no profile row for identity");
                    (None, ProfileLookup::Missing)
                }
                Err(e) => {
                    warn!(identity = %identity.id, error = %e, "profile lookup failed");
                    (None, ProfileLookup::Failed(e.to_string()))
                }
            };

        Session {
            identity: Some(identity),
            profile,
            loading: false,
            profile_lookup,
            revision: 0,
        }
    }

    async fn resolve_trigger(&self, trigger: Trigger) -> Session {
        match trigger {
            Trigger::Event(event) => self.resolve(event.session.map(|s| s.user)).await,
            Trigger::Resync => {
                let identity = self.current_identity().await;
                self.resolve(identity).await
            }
        }
    }

    fn classify(incoming: std::result::Result<AuthEvent, broadcast::error::RecvError>) -> Option<Trigger> {
        match incoming {
            Ok(event) => {
                debug!(kind = ?event.kind, "auth event received");
                Some(Trigger::Event(event))
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "auth events dropped, resynchronizing session");
                Some(Trigger::Resync)
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// The listener loop. Events are taken one at a time in arrival order; an event
    /// arriving while the previous one is still resolving supersedes it.
    async fn listen(
        self: Arc<Self>,
        mut events: AuthSubscription,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut pending: Option<Trigger> = None;

        loop {
            let trigger = match pending.take() {
                Some(trigger) => trigger,
                None => {
                    let incoming = tokio::select! {
                        _ = shutdown.recv() => break,
                        incoming = events.recv() => incoming,
                    };
                    match Self::classify(incoming) {
                        Some(trigger) => trigger,
                        None => break,
                    }
                }
            };

            let revision = self.next_revision();
            let resolution = self.resolve_trigger(trigger);
            tokio::pin!(resolution);

            let step = tokio::select! {
                session = &mut resolution => Step::Done(session),
                _ = shutdown.recv() => Step::Shutdown,
                incoming = events.recv() => Step::Superseded(Self::classify(incoming)),
            };

            match step {
                Step::Done(session) => {
                    debug!(revision, state = ?session.state(), "auth event resolved");
                    self.publish(revision, session);
                }
                Step::Superseded(Some(next)) => {
                    debug!(revision, "resolution superseded by a newer auth event");
                    pending = Some(next);
                }
                Step::Superseded(None) => {
                    let session = resolution.await;
                    self.publish(revision, session);
                    break;
                }
                Step::Shutdown => break,
            }
        }

        debug!("session listener stopped");
    }
}
