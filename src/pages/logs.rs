use serde::Serialize;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    data_service::{DataService, Query, Table, fetch_all},
    error::Result,
    format::{ActionKind, action_kind, matches_search},
    models::ActivityLog,
};

/// Only the most recent entries are loaded.
pub const LOG_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct LogView {
    pub log: ActivityLog,
    pub kind: ActionKind,
}

#[derive(Debug, Clone, Default)]
pub struct LogsPage {
    logs: Vec<ActivityLog>,
}

impl LogsPage {
    pub async fn load(data: &dyn DataService) -> Result<Self> {
        let query = Query::new().newest_first().limit(LOG_LIMIT);
        let logs = fetch_all(data, Table::ActivityLogs, query).await?;
        Ok(Self { logs })
    }

    pub fn logs(&self) -> &[ActivityLog] {
        &self.logs
    }

    /// Entries whose action or content contains `term`.
    pub fn search(&self, term: &str) -> Vec<LogView> {
        self.logs
            .iter()
            .filter(|log| matches_search(&log.action, term) || matches_search(&log.content, term))
            .map(|log| LogView {
                log: log.clone(),
                kind: action_kind(&log.action),
            })
            .collect()
    }
}
