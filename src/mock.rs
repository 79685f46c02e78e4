use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::{
    auth::{
        AUTH_EVENT_CAPACITY, AuthEvent, AuthEventKind, AuthService, AuthSession, AuthSubscription,
        CredentialsPatch, Identity,
    },
    data_service::{DataService, Query, RowId, Table},
    error::{AppError, Result},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The text a filter compares against: strings as-is, everything else as JSON.
fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_cells(a: &Value, b: &Value) -> CmpOrdering {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Null, Value::Null) => CmpOrdering::Equal,
        (Value::Null, _) => CmpOrdering::Less,
        (_, Value::Null) => CmpOrdering::Greater,
        _ => CmpOrdering::Equal,
    }
}

fn matches(row: &Value, query: &Query) -> bool {
    query.filters.iter().all(|filter| {
        row.get(&filter.column)
            .is_some_and(|cell| cell_text(cell) == filter.value)
    })
}

fn has_id(row: &Value, id: &RowId) -> bool {
    row.get("id").is_some_and(|cell| cell_text(cell) == id.to_string())
}

/// MockBackend
///
/// An in-memory stand-in for the hosted backend implementing both `DataService` and
/// `AuthService`. Tables are plain JSON rows; latency and failures can be injected
/// per table so tests can drive the session store through slow or failing lookups.
pub struct MockBackend {
    tables: Mutex<HashMap<Table, Vec<Value>>>,
    next_id: AtomicI64,
    failing: Mutex<HashSet<Table>>,
    failing_reads: Mutex<HashSet<Table>>,
    // Keyed by table and a filter value; applies to selects filtering on that value.
    delays: Mutex<HashMap<(Table, String), Duration>>,
    selects: Mutex<HashMap<Table, usize>>,
    accounts: Mutex<HashMap<String, (String, Identity)>>,
    current: Mutex<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
    fail_sign_out: AtomicBool,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            tables: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            failing: Mutex::new(HashSet::new()),
            failing_reads: Mutex::new(HashSet::new()),
            delays: Mutex::new(HashMap::new()),
            selects: Mutex::new(HashMap::new()),
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            events,
            fail_sign_out: AtomicBool::new(false),
        }
    }

    /// A session for `identity` with deterministic tokens and no expiry.
    pub fn session_for(identity: &Identity) -> AuthSession {
        AuthSession {
            access_token: format!("mock-access-{}", identity.id),
            refresh_token: format!("mock-refresh-{}", identity.id),
            expires_at: None,
            user: identity.clone(),
        }
    }

    /// Registers an account that `sign_in` accepts.
    pub fn with_account(self, email: &str, password: &str, identity: Identity) -> Self {
        lock(&self.accounts).insert(email.to_string(), (password.to_string(), identity));
        self
    }

    /// Appends rows to `table` as-is.
    pub fn seed(&self, table: Table, rows: impl IntoIterator<Item = Value>) {
        lock(&self.tables).entry(table).or_default().extend(rows);
    }

    pub fn rows(&self, table: Table) -> Vec<Value> {
        lock(&self.tables).get(&table).cloned().unwrap_or_default()
    }

    /// Makes every operation on `table` fail (or succeed again).
    pub fn fail_table(&self, table: Table, failing: bool) {
        let mut set = lock(&self.failing);
        if failing {
            set.insert(table);
        } else {
            set.remove(&table);
        }
    }

    /// Makes selects and counts on `table` fail while writes still succeed.
    pub fn fail_reads(&self, table: Table, failing: bool) {
        let mut set = lock(&self.failing_reads);
        if failing {
            set.insert(table);
        } else {
            set.remove(&table);
        }
    }

    /// Delays selects on `table` that filter on `value`.
    pub fn delay_select(&self, table: Table, value: impl ToString, delay: Duration) {
        lock(&self.delays).insert((table, value.to_string()), delay);
    }

    pub fn set_fail_sign_out(&self, failing: bool) {
        self.fail_sign_out.store(failing, Ordering::SeqCst);
    }

    /// Replaces the current session without emitting an event, as if restored.
    pub fn set_session(&self, session: Option<AuthSession>) {
        *lock(&self.current) = session;
    }

    pub fn current_session(&self) -> Option<AuthSession> {
        lock(&self.current).clone()
    }

    /// Broadcasts `event` to every subscriber, updating the current session to match.
    pub fn emit(&self, event: AuthEvent) {
        *lock(&self.current) = event.session.clone();
        let _ = self.events.send(event);
    }

    /// Number of selects issued against `table` so far.
    pub fn select_calls(&self, table: Table) -> usize {
        lock(&self.selects).get(&table).copied().unwrap_or(0)
    }

    fn check_failing(&self, table: Table) -> Result<()> {
        if lock(&self.failing).contains(&table) {
            return Err(AppError::Service {
                status: 503,
                message: format!("mock failure on {table}"),
            });
        }
        Ok(())
    }

    fn check_readable(&self, table: Table) -> Result<()> {
        self.check_failing(table)?;
        if lock(&self.failing_reads).contains(&table) {
            return Err(AppError::Service {
                status: 503,
                message: format!("mock read failure on {table}"),
            });
        }
        Ok(())
    }

    fn delay_for(&self, table: Table, query: &Query) -> Option<Duration> {
        let delays = lock(&self.delays);
        query
            .filters
            .iter()
            .find_map(|filter| delays.get(&(table, filter.value.clone())).copied())
    }
}

#[async_trait]
impl DataService for MockBackend {
    async fn select(&self, table: Table, query: Query) -> Result<Vec<Value>> {
        *lock(&self.selects).entry(table).or_default() += 1;

        // The lock is released before sleeping.
        if let Some(delay) = self.delay_for(table, &query) {
            tokio::time::sleep(delay).await;
        }
        self.check_readable(table)?;

        let mut rows: Vec<Value> = self
            .rows(table)
            .into_iter()
            .filter(|row| matches(row, &query))
            .collect();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let a = a.get(&order.column).unwrap_or(&Value::Null);
                let b = b.get(&order.column).unwrap_or(&Value::Null);
                let ord = compare_cells(a, b);
                if order.ascending { ord } else { ord.reverse() }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn count(&self, table: Table, query: Query) -> Result<u64> {
        self.check_readable(table)?;
        let count = self
            .rows(table)
            .iter()
            .filter(|row| matches(row, &query))
            .count();
        Ok(count as u64)
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value> {
        self.check_failing(table)?;

        let Value::Object(mut fields) = row else {
            return Err(AppError::Validation("row must be a JSON object".to_string()));
        };
        let now = Value::String(Utc::now().to_rfc3339());
        fields
            .entry("id")
            .or_insert_with(|| Value::from(self.next_id.fetch_add(1, Ordering::SeqCst)));
        fields.entry("created_at").or_insert_with(|| now.clone());
        fields.entry("updated_at").or_insert(now);

        let stored = Value::Object(fields);
        lock(&self.tables)
            .entry(table)
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, table: Table, id: RowId, patch: Value) -> Result<Value> {
        self.check_failing(table)?;

        let Value::Object(patch) = patch else {
            return Err(AppError::Validation("patch must be a JSON object".to_string()));
        };

        let mut tables = lock(&self.tables);
        let row = tables
            .get_mut(&table)
            .and_then(|rows| rows.iter_mut().find(|row| has_id(row, &id)))
            .ok_or_else(|| AppError::NotFound(format!("{table} row {id}")))?;

        let Value::Object(fields) = row else {
            return Err(AppError::Service {
                status: 500,
                message: format!("{table} row {id} is not an object"),
            });
        };
        fields.extend(patch);
        if fields.contains_key("updated_at") {
            fields.insert("updated_at".to_string(), Value::String(Utc::now().to_rfc3339()));
        }
        Ok(Value::Object(fields.clone()))
    }

    async fn delete(&self, table: Table, id: RowId) -> Result<()> {
        self.check_failing(table)?;
        if let Some(rows) = lock(&self.tables).get_mut(&table) {
            rows.retain(|row| !has_id(row, &id));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthService for MockBackend {
    async fn get_session(&self) -> Result<Option<AuthSession>> {
        Ok(self.current_session())
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let identity = lock(&self.accounts)
            .get(email)
            .filter(|(expected, _)| expected == password)
            .map(|(_, identity)| identity.clone())
            .ok_or_else(|| AppError::Auth("Invalid login credentials".to_string()))?;

        let session = Self::session_for(&identity);
        self.emit(AuthEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        self.emit(AuthEvent::signed_out());
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(AppError::Service {
                status: 503,
                message: "mock sign-out failure".to_string(),
            });
        }
        Ok(())
    }

    async fn update_credentials(&self, patch: CredentialsPatch) -> Result<Identity> {
        let mut session = self
            .current_session()
            .ok_or_else(|| AppError::Auth("not signed in".to_string()))?;

        {
            let mut accounts = lock(&self.accounts);
            let entry = accounts
                .iter_mut()
                .find(|(_, (_, identity))| identity.id == session.user.id);
            if let Some((_, (password, _))) = entry {
                if let Some(new_password) = &patch.password {
                    *password = new_password.clone();
                }
            }
        }
        if let Some(email) = patch.email {
            session.user.email = Some(email);
        }

        let identity = session.user.clone();
        self.emit(AuthEvent {
            kind: AuthEventKind::UserUpdated,
            session: Some(session),
        });
        Ok(identity)
    }
}
