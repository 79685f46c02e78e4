use std::{env, path::PathBuf};

use crate::error::{AppError, Result};

/// AppConfig
///
/// Holds the console's entire configuration state. Immutable once loaded and shared
/// through `AppState` like every other dependency.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Base URL of the Supabase project (REST + auth gateway).
    pub supabase_url: String,
    // Public (anon) API key sent as `apikey` on every backend request.
    pub supabase_anon_key: String,
    // Runtime environment marker. Controls the log format.
    pub env: Env,
    // Address the local console listens on.
    pub bind_addr: String,
    // Where the auth session is persisted between restarts, if anywhere.
    pub session_file: Option<PathBuf>,
}

/// Env
///
/// Runtime context: pretty logs for a developer terminal, JSON logs when deployed.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

impl Default for AppConfig {
    /// Non-failing configuration for test scaffolding.
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            env: Env::Local,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            session_file: None,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from the process environment. The endpoint URL and the
    /// public key are mandatory; a missing or empty value is a fatal startup error.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// from_lookup
    ///
    /// Same as `load` but reads values through `lookup`, so callers can supply a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(key))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        let supabase_url = get(&["SUPABASE_URL", "VITE_SUPABASE_URL"])
            .ok_or_else(|| AppError::Config("SUPABASE_URL must be set".to_string()))?;
        let supabase_anon_key = get(&[
            "SUPABASE_ANON_KEY",
            "VITE_SUPABASE_SUPABASE_ANON_KEY",
            "VITE_SUPABASE_ANON_KEY",
        ])
            .ok_or_else(|| AppError::Config("SUPABASE_ANON_KEY must be set".to_string()))?;

        if !supabase_url.starts_with("http://") && !supabase_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "SUPABASE_URL must be an http(s) URL, got {supabase_url:?}"
            )));
        }

        let env = match get(&["APP_ENV"]).as_deref() {
            Some("production") => Env::Production,
            _ => Env::Local,
        };

        Ok(Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_anon_key,
            env,
            bind_addr: get(&["BIND_ADDR"]).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            session_file: get(&["SESSION_FILE"]).map(PathBuf::from),
        })
    }
}
