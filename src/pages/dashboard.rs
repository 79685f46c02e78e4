use chrono::{DateTime, Utc};
use serde::Serialize;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    data_service::{DataService, Query, Table},
    error::Result,
    format::{format_bytes, format_limit, traffic_percentage},
    models::{Profile, Role},
};

/// Record counts shown on the dashboard cards. `users` is only counted for admins.
#[derive(Debug, Clone, PartialEq, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct DashboardStats {
    pub nodes: u64,
    pub routes: u64,
    pub acls: u64,
    pub users: Option<u64>,
}

/// TrafficSummary
///
/// Traffic used against the profile's limit, raw and humanized.
#[derive(Debug, Clone, PartialEq, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct TrafficSummary {
    pub used: u64,
    pub limit: u64,
    pub used_display: String,
    pub limit_display: String,
    // 0 when the limit is unlimited.
    pub percentage: f64,
}

impl TrafficSummary {
    pub fn of(profile: &Profile) -> Self {
        Self {
            used: profile.traffic_used,
            limit: profile.traffic_limit,
            used_display: format_bytes(profile.traffic_used),
            limit_display: format_limit(profile.traffic_limit),
            percentage: traffic_percentage(profile.traffic_used, profile.traffic_limit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct AccountStatus {
    pub username: String,
    pub role: Role,
    pub is_active: bool,
    pub expiration_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct DashboardView {
    pub stats: DashboardStats,
    pub traffic: TrafficSummary,
    pub account: AccountStatus,
}

/// load
///
/// Counts the visible records concurrently. Any failing count fails the page.
pub async fn load(data: &dyn DataService, profile: &Profile) -> Result<DashboardView> {
    let users = async {
        if profile.is_admin() {
            data.count(Table::UserProfiles, Query::new()).await.map(Some)
        } else {
            Ok(None)
        }
    };

    let (nodes, routes, acls, users) = tokio::try_join!(
        data.count(Table::Nodes, Query::new()),
        data.count(Table::Routes, Query::new()),
        data.count(Table::Acls, Query::new()),
        users,
    )?;

    Ok(DashboardView {
        stats: DashboardStats {
            nodes,
            routes,
            acls,
            users,
        },
        traffic: TrafficSummary::of(profile),
        account: AccountStatus {
            username: profile.username.clone(),
            role: profile.role,
            is_active: profile.is_active,
            expiration_date: profile.expiration_date,
        },
    })
}
