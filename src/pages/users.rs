use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    data_service::{DataService, Query, Table, fetch_all, update_row},
    error::{AppError, Result},
    format::matches_search,
    models::{Profile, Role, UserUpdate},
};

#[derive(Serialize)]
struct ProfilePatch<'a> {
    username: &'a str,
    role: Role,
    is_active: bool,
    traffic_limit: u64,
    // Serialized as null to clear the expiration.
    expiration_date: Option<DateTime<Utc>>,
}

/// UsersPage
///
/// Every profile, for administrators. Callers gate access with the navigation guard;
/// the backend enforces it again through row-level security.
#[derive(Debug, Clone, Default)]
pub struct UsersPage {
    users: Vec<Profile>,
}

impl UsersPage {
    pub async fn load(data: &dyn DataService) -> Result<Self> {
        let users = fetch_all(data, Table::UserProfiles, Query::new().newest_first()).await?;
        Ok(Self { users })
    }

    pub fn users(&self) -> &[Profile] {
        &self.users
    }

    /// Profiles whose username or role contains `term`.
    pub fn search(&self, term: &str) -> Vec<Profile> {
        self.users
            .iter()
            .filter(|user| {
                matches_search(&user.username, term) || matches_search(user.role.as_str(), term)
            })
            .cloned()
            .collect()
    }

    /// The edit form prefilled from profile `id`.
    pub fn edit_form(&self, id: Uuid) -> Result<UserUpdate> {
        let user = self
            .users
            .iter()
            .find(|user| user.id == id)
            .ok_or_else(|| AppError::NotFound(format!("user {id}")))?;

        Ok(UserUpdate {
            username: user.username.clone(),
            role: user.role,
            is_active: user.is_active,
            traffic_limit: user.traffic_limit,
            expiration_date: user.expiration_date.map(|at| at.date_naive()),
        })
    }

    /// update
    ///
    /// Writes the edit form to profile `id`. The expiration date is stored as the
    /// start of that day (UTC).
    pub async fn update(&mut self, data: &dyn DataService, id: Uuid, form: &UserUpdate) -> Result<()> {
        let username = form.username.trim();
        if username.is_empty() {
            return Err(AppError::Validation("Username is required".to_string()));
        }

        let patch = ProfilePatch {
            username,
            role: form.role,
            is_active: form.is_active,
            traffic_limit: form.traffic_limit,
            expiration_date: form
                .expiration_date
                .map(|date| date.and_time(NaiveTime::MIN).and_utc()),
        };
        let updated: Profile = update_row(data, Table::UserProfiles, id.into(), &patch).await?;
        tracing::info!(user = %updated.id, role = updated.role.as_str(), "user profile updated");

        match Self::load(data).await {
            Ok(page) => *self = page,
            Err(e) => {
                tracing::warn!(
                    user = %updated.id,
                    error = %e,
                    "profile updated but the list could not be reloaded"
                );
                match self.users.iter_mut().find(|user| user.id == updated.id) {
                    Some(user) => *user = updated,
                    None => self.users.insert(0, updated),
                }
            }
        }
        Ok(())
    }

    pub async fn delete(&mut self, data: &dyn DataService, id: Uuid) -> Result<()> {
        data.delete(Table::UserProfiles, id.into()).await?;
        self.users.retain(|user| user.id != id);
        Ok(())
    }
}
