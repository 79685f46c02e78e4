use chrono::{DateTime, Utc};
use serde::Serialize;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    auth::Identity,
    format::is_expired,
    models::Profile,
    pages::dashboard::TrafficSummary,
};

/// ProfileView
///
/// The signed-in profile and identity. Read straight from the session; nothing is
/// fetched.
#[derive(Debug, Clone, PartialEq, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct ProfileView {
    pub identity: Identity,
    pub profile: Profile,
    pub traffic: TrafficSummary,
    pub expired: bool,
}

impl ProfileView {
    pub fn new(identity: &Identity, profile: &Profile, now: DateTime<Utc>) -> Self {
        Self {
            identity: identity.clone(),
            profile: profile.clone(),
            traffic: TrafficSummary::of(profile),
            expired: is_expired(profile.expiration_date, now),
        }
    }
}
