use chrono::{DateTime, Duration, Utc};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    data_service::{DataService, Query, Table, fetch_all, insert_row},
    error::{AppError, Result},
    format::is_expired,
    models::PreauthKey,
};

pub const KEY_PREFIX: &str = "hskey-";
const KEY_RANDOM_LEN: usize = 32;

/// generate_key
///
/// A fresh pre-auth key: `hskey-` followed by 32 random alphanumeric characters.
pub fn generate_key() -> String {
    let suffix = Alphanumeric.sample_string(&mut rand::rng(), KEY_RANDOM_LEN);
    format!("{KEY_PREFIX}{suffix}")
}

/// ExpirationPreset
///
/// The expiration choices of the "Create Key" form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub enum ExpirationPreset {
    #[serde(rename = "1h")]
    OneHour,
    #[default]
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    OneWeek,
    #[serde(rename = "custom")]
    Custom,
}

impl ExpirationPreset {
    /// The expiration instant for a key created at `now`. `Custom` takes `custom`
    /// and fails without it.
    pub fn expiration(
        self,
        custom: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        match self {
            ExpirationPreset::OneHour => Ok(now + Duration::hours(1)),
            ExpirationPreset::OneDay => Ok(now + Duration::hours(24)),
            ExpirationPreset::OneWeek => Ok(now + Duration::days(7)),
            ExpirationPreset::Custom => custom.ok_or_else(|| {
                AppError::Validation("Please select a custom expiration date".to_string())
            }),
        }
    }
}

/// NewPreauthKeyRequest
///
/// Payload of the "Create Key" form.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct NewPreauthKeyRequest {
    #[serde(default)]
    pub expiration: ExpirationPreset,
    #[serde(default)]
    pub custom_expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS, ToSchema)]
#[ts(export)]
pub enum KeyStatus {
    Active,
    Used,
    Expired,
}

/// Used wins over expired.
pub fn key_status(key: &PreauthKey, now: DateTime<Utc>) -> KeyStatus {
    if key.used {
        KeyStatus::Used
    } else if is_expired(key.expiration, now) {
        KeyStatus::Expired
    } else {
        KeyStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct PreauthKeyView {
    pub key: PreauthKey,
    pub status: KeyStatus,
}

#[derive(Serialize)]
struct NewKey {
    user_id: Uuid,
    key: String,
    expiration: DateTime<Utc>,
    used: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PreauthKeysPage {
    keys: Vec<PreauthKey>,
}

impl PreauthKeysPage {
    pub async fn load(data: &dyn DataService) -> Result<Self> {
        let keys = fetch_all(data, Table::PreauthKeys, Query::new().newest_first()).await?;
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[PreauthKey] {
        &self.keys
    }

    pub fn views(&self, now: DateTime<Utc>) -> Vec<PreauthKeyView> {
        self.keys
            .iter()
            .map(|key| PreauthKeyView {
                key: key.clone(),
                status: key_status(key, now),
            })
            .collect()
    }

    /// create
    ///
    /// Generates a key for `owner` and stores it unused. Returns the stored key so the
    /// caller can show it once.
    pub async fn create(
        &mut self,
        data: &dyn DataService,
        owner: Uuid,
        request: &NewPreauthKeyRequest,
        now: DateTime<Utc>,
    ) -> Result<PreauthKey> {
        let expiration = request
            .expiration
            .expiration(request.custom_expiration, now)?;

        let row = NewKey {
            user_id: owner,
            key: generate_key(),
            expiration,
            used: false,
        };
        let created: PreauthKey = insert_row(data, Table::PreauthKeys, &row).await?;
        tracing::info!(key_id = created.id, %expiration, "pre-auth key created");

        match Self::load(data).await {
            Ok(page) => *self = page,
            Err(e) => {
                tracing::warn!(
                    key_id = created.id,
                    error = %e,
                    "key created but the list could not be reloaded"
                );
                self.keys.insert(0, created.clone());
            }
        }
        Ok(created)
    }

    pub async fn delete(&mut self, data: &dyn DataService, id: i64) -> Result<()> {
        data.delete(Table::PreauthKeys, id.into()).await?;
        self.keys.retain(|key| key.id != id);
        Ok(())
    }
}
