//! Query API error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use custody_storage::StorageError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::auth::AuthDenied;

/// Errors returned by the query routes.
///
/// Every variant renders as `{"status": "error", "msg": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A query parameter did not parse.
    #[error("{0}")]
    BadRequest(String),
    /// No usable credentials.
    #[error("{0}")]
    Unauthorized(String),
    /// Credentials refused.
    #[error("{0}")]
    Forbidden(String),
    /// No such route.
    #[error("not found")]
    NotFound,
    /// The repository failed.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthDenied> for ApiError {
    fn from(denied: AuthDenied) -> Self {
        match denied {
            AuthDenied::Unauthorized(msg) => Self::Unauthorized(msg),
            AuthDenied::Forbidden(msg) => Self::Forbidden(msg),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        error!(error = %e, "Search failed");
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({ "status": "error", "msg": self.to_string() });
        (status, Json(body)).into_response()
    }
}
