use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::acl::AclRules;

// --- Core Records (mapped to backend tables) ---

/// Role
///
/// The RBAC field of a profile. Only the Users page (admin-only) may change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

/// Profile
///
/// Application-owned record keyed 1:1 to an auth identity (`user_profiles` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Profile {
    // Primary key, also the id of the auth identity.
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub expiration_date: Option<DateTime<Utc>>,
    // Bytes; 0 means unlimited.
    pub traffic_limit: u64,
    pub traffic_used: u64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Node
///
/// A Headscale machine registered by a user (`nodes` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Node {
    pub id: i64,
    pub user_id: Uuid,
    pub headscale_id: Option<String>,
    pub node_name: String,
    pub ip_address: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub client_version: Option<String>,
    pub os: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Route
///
/// A subnet route advertised by a node (`routes` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Route {
    pub id: i64,
    pub user_id: Uuid,
    pub node_id: i64,
    pub headscale_route_id: Option<String>,
    // CIDR prefix, e.g. "10.0.0.0/24".
    pub route: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Acl
///
/// A named ACL (`acls` table). `rules` is parsed at the boundary into a rule list or
/// a policy document; rows holding other JSON keep it as `Unrecognized`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Acl {
    pub id: i64,
    pub user_id: Uuid,
    pub name: String,
    pub rules: AclRules,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// PreauthKey
///
/// A pre-authentication key used to register nodes without interactive login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PreauthKey {
    pub id: i64,
    pub user_id: Uuid,
    pub key: String,
    pub expiration: Option<DateTime<Utc>>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

/// ActivityLog
///
/// Append-only audit entry written by the backend (`activity_logs` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ActivityLog {
    pub id: i64,
    pub user_id: Uuid,
    pub action: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// --- Request Payloads ---

/// SignInRequest
///
/// Credentials for `POST /auth/sign-in`. Only forwarded to the auth service, never logged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// NewRouteRequest
///
/// Payload of the "Add Route" form. New routes start disabled.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct NewRouteRequest {
    pub node_id: i64,
    pub route: String,
}

/// AclForm
///
/// The ACL modal: a name and the rules as JSON text, parsed and validated on submit.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AclForm {
    pub name: String,
    pub rules: String,
}

/// UserUpdate
///
/// The admin "Edit User" form. `expiration_date` is a calendar date; `None` clears it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserUpdate {
    pub username: String,
    pub role: Role,
    pub is_active: bool,
    pub traffic_limit: u64,
    pub expiration_date: Option<NaiveDate>,
}

/// PasswordChange
///
/// The Settings page password form.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PasswordChange {
    pub new_password: String,
    pub confirm_password: String,
}
