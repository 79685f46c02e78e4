use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Table
///
/// The backend tables the console reads and writes. Row-level security on the
/// backend scopes every table to the signed-in identity (admins see everything).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    UserProfiles,
    Nodes,
    Routes,
    Acls,
    PreauthKeys,
    ActivityLogs,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::UserProfiles => "user_profiles",
            Table::Nodes => "nodes",
            Table::Routes => "routes",
            Table::Acls => "acls",
            Table::PreauthKeys => "preauth_keys",
            Table::ActivityLogs => "activity_logs",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RowId
///
/// Primary key of a row: profiles are keyed by identity UUID, everything else by a
/// bigint sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowId {
    Int(i64),
    Uuid(Uuid),
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Int(id) => write!(f, "{id}"),
            RowId::Uuid(id) => write!(f, "{id}"),
        }
    }
}

impl From<i64> for RowId {
    fn from(id: i64) -> Self {
        RowId::Int(id)
    }
}

impl From<Uuid> for RowId {
    fn from(id: Uuid) -> Self {
        RowId::Uuid(id)
    }
}

/// An equality filter on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Query
///
/// Filter / order / limit applied to a table-scoped select or count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    /// Newest first, the order every list page uses.
    pub fn newest_first(self) -> Self {
        self.order_by("created_at", false)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The query string parameters PostgREST understands for this query.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|f| (f.column.clone(), format!("eq.{}", f.value)))
            .collect();
        if let Some(order) = &self.order {
            let dir = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{dir}", order.column)));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

/// DataService Trait
///
/// The abstract, table-scoped contract of the hosted backend. Handlers and pages
/// depend only on this trait, so the concrete client (Supabase over HTTP, or the
/// in-memory mock in tests) can be swapped without touching them.
#[async_trait]
pub trait DataService: Send + Sync {
    async fn select(&self, table: Table, query: Query) -> Result<Vec<Value>>;

    /// Number of rows matching `query` (order and limit are ignored).
    async fn count(&self, table: Table, query: Query) -> Result<u64>;

    /// Inserts `row` and returns the stored row, including generated columns.
    async fn insert(&self, table: Table, row: Value) -> Result<Value>;

    /// Applies `patch` to the row with `id`; `NotFound` when no row matched.
    async fn update(&self, table: Table, id: RowId, patch: Value) -> Result<Value>;

    async fn delete(&self, table: Table, id: RowId) -> Result<()>;
}

/// DataServiceState
///
/// The shared handle to the data service held in `AppState`.
pub type DataServiceState = Arc<dyn DataService>;

// --- Typed helpers: rows are parsed at the boundary ---

pub async fn fetch_all<T: DeserializeOwned>(
    data: &dyn DataService,
    table: Table,
    query: Query,
) -> Result<Vec<T>> {
    data.select(table, query)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(AppError::from))
        .collect()
}

pub async fn fetch_optional<T: DeserializeOwned>(
    data: &dyn DataService,
    table: Table,
    query: Query,
) -> Result<Option<T>> {
    let rows = data.select(table, query.limit(1)).await?;
    rows.into_iter()
        .next()
        .map(serde_json::from_value)
        .transpose()
        .map_err(AppError::from)
}

pub async fn insert_row<T: DeserializeOwned, P: Serialize>(
    data: &dyn DataService,
    table: Table,
    row: &P,
) -> Result<T> {
    let stored = data.insert(table, serde_json::to_value(row)?).await?;
    Ok(serde_json::from_value(stored)?)
}

pub async fn update_row<T: DeserializeOwned, P: Serialize>(
    data: &dyn DataService,
    table: Table,
    id: RowId,
    patch: &P,
) -> Result<T> {
    let stored = data.update(table, id, serde_json::to_value(patch)?).await?;
    Ok(serde_json::from_value(stored)?)
}
