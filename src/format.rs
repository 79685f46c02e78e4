//! Display helpers shared by the pages.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// format_bytes
///
/// Humanizes a byte count with 1024-based units and at most two decimals:
/// `0 B`, `1 KB`, `1.5 MB`. Sizes beyond terabytes stay in TB.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut unit = 0;
    while unit + 1 < UNITS.len() && bytes >= 1024u64.pow(unit as u32 + 1) {
        unit += 1;
    }

    let value = bytes as f64 / 1024f64.powi(unit as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

/// Traffic limit as displayed: humanized, or "Unlimited" for 0.
pub fn format_limit(limit: u64) -> String {
    if limit > 0 {
        format_bytes(limit)
    } else {
        "Unlimited".to_string()
    }
}

/// Share of the limit used, in percent. 0 when unlimited.
pub fn traffic_percentage(used: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    used as f64 / limit as f64 * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum NodeStatus {
    /// Seen within the last 5 minutes.
    Online,
    /// Seen within the last 30 minutes.
    Idle,
    Offline,
    /// Never seen.
    Unknown,
}

/// node_status
///
/// Status heuristic from the node's last check-in.
pub fn node_status(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> NodeStatus {
    let Some(last_seen) = last_seen else {
        return NodeStatus::Unknown;
    };

    let since = now - last_seen;
    if since < Duration::minutes(5) {
        NodeStatus::Online
    } else if since < Duration::minutes(30) {
        NodeStatus::Idle
    } else {
        NodeStatus::Offline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ActionKind {
    Create,
    Delete,
    Update,
    Other,
}

/// Classifies an activity log action by the verb it contains.
pub fn action_kind(action: &str) -> ActionKind {
    let action = action.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| action.contains(w));

    if has(&["create", "add"]) {
        ActionKind::Create
    } else if has(&["delete", "remove"]) {
        ActionKind::Delete
    } else if has(&["update", "edit"]) {
        ActionKind::Update
    } else {
        ActionKind::Other
    }
}

/// True when `expiration` lies in the past. No expiration never expires.
pub fn is_expired(expiration: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expiration.is_some_and(|at| at < now)
}

/// Case-insensitive substring match used by every search box.
pub fn matches_search(haystack: &str, term: &str) -> bool {
    haystack.to_lowercase().contains(&term.trim().to_lowercase())
}
