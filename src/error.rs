use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, AppError>;

/// AppError
///
/// The single error taxonomy of the console. Variants map onto the four failure
/// classes the console distinguishes:
/// - `Config`: missing or malformed startup configuration (fatal).
/// - `Auth`: bad credentials, expired or revoked tokens (reported, session stays anonymous).
/// - `Service` / `Http` / `Json`: data service failures (reported, local state unchanged).
/// - `Validation`: form input rejected before anything is written.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("data service error ({status}): {message}")]
    Service { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session store already initialized")]
    AlreadyInitialized,
}

impl AppError {
    /// Builds an error from a non-success response of the backend.
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            401 => AppError::Auth(message),
            403 => AppError::Forbidden(message),
            404 => AppError::NotFound(message),
            code => AppError::Service {
                status: code,
                message,
            },
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::Auth(_) | AppError::Token(_))
    }

    /// The status the local console answers with when this error reaches a handler.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::AlreadyInitialized | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Auth(_) | AppError::Token(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Service { .. } | AppError::Http(_) | AppError::Json(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// PageError
///
/// What a page handler answers with when it cannot render its content. Besides plain
/// errors, a page can be blocked by the session still loading, by a signed-in identity
/// whose profile is not available yet, or by the navigation guard.
#[derive(Debug)]
pub enum PageError {
    /// The session has not been resolved yet.
    Loading,
    /// Signed in, but no profile row is available; pages show a neutral view.
    AwaitingProfile,
    /// The navigation guard sent the viewer elsewhere.
    Redirect(String),
    App(AppError),
}

impl From<AppError> for PageError {
    fn from(err: AppError) -> Self {
        PageError::App(err)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        match self {
            PageError::Loading => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "loading" })),
            )
                .into_response(),
            PageError::AwaitingProfile => (
                StatusCode::ACCEPTED,
                Json(json!({ "status": "awaiting_profile" })),
            )
                .into_response(),
            PageError::Redirect(to) => Redirect::to(&to).into_response(),
            PageError::App(err) => err.into_response(),
        }
    }
}
