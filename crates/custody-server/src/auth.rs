//! Request authorization for the query routes.

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use thiserror::Error;

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthDenied {
    /// No usable credentials were presented.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Credentials were presented but do not grant access.
    #[error("forbidden: {0}")]
    Forbidden(String),
}

/// Decides whether a query request may proceed.
#[async_trait]
pub trait RequestAuthorizer: Send + Sync {
    /// Check one request.
    async fn authorize(&self, path: &str, headers: &HeaderMap) -> Result<(), AuthDenied>;
}

/// Lets every request through.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl RequestAuthorizer for AllowAll {
    async fn authorize(&self, _path: &str, _headers: &HeaderMap) -> Result<(), AuthDenied> {
        Ok(())
    }
}

/// Requires `Authorization: Bearer <token>` with a fixed token.
#[derive(Clone)]
pub struct BearerTokenAuthorizer {
    token: String,
}

impl BearerTokenAuthorizer {
    /// Accept exactly `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for BearerTokenAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenAuthorizer").finish_non_exhaustive()
    }
}

#[async_trait]
impl RequestAuthorizer for BearerTokenAuthorizer {
    async fn authorize(&self, _path: &str, headers: &HeaderMap) -> Result<(), AuthDenied> {
        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| AuthDenied::Unauthorized("missing bearer token".into()))?;

        if presented == self.token {
            Ok(())
        } else {
            Err(AuthDenied::Forbidden("token not accepted".into()))
        }
    }
}
