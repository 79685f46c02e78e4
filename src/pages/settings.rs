use chrono::{DateTime, Utc};
use serde::Serialize;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    auth::{AuthService, CredentialsPatch, Identity},
    error::{AppError, Result},
    models::PasswordChange,
};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Account information shown on the Settings page.
#[derive(Debug, Clone, PartialEq, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct AccountInfo {
    pub email: Option<String>,
    pub email_confirmed: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

impl From<&Identity> for AccountInfo {
    fn from(identity: &Identity) -> Self {
        Self {
            email: identity.email.clone(),
            email_confirmed: identity.email_confirmed_at.is_some(),
            created_at: identity.created_at,
            last_sign_in_at: identity.last_sign_in_at,
        }
    }
}

/// validate_password
///
/// The confirmation must match and the password must have at least
/// `MIN_PASSWORD_LEN` characters.
pub fn validate_password(change: &PasswordChange) -> Result<()> {
    if change.new_password != change.confirm_password {
        return Err(AppError::Validation("Passwords do not match".to_string()));
    }
    if change.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Validates `change` and applies it to the signed-in identity.
pub async fn change_password(auth: &dyn AuthService, change: &PasswordChange) -> Result<()> {
    validate_password(change)?;

    let identity = auth
        .update_credentials(CredentialsPatch {
            password: Some(change.new_password.clone()),
            ..CredentialsPatch::default()
        })
        .await?;

    tracing::info!(identity = %identity.id, "password updated");
    Ok(())
}
