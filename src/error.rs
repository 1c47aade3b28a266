//! Error taxonomy for the security layer and its HTTP mapping.
//!
//! Clients only ever see a status and a short machine-readable code. Which record,
//! which factor or which check failed is logged by the caller and never serialized.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

pub const CODE_INVALID_CREDENTIALS: &str = "INVALID_CREDENTIALS";
pub const CODE_ACCOUNT_DISABLED: &str = "ACCOUNT_DISABLED";
pub const CODE_INVALID_OR_EXPIRED: &str = "INVALID_OR_EXPIRED";
pub const CODE_CSRF_MISMATCH: &str = "CSRF_MISMATCH";
pub const CODE_INSUFFICIENT_TRUST: &str = "INSUFFICIENT_TRUST";
pub const CODE_CERTIFICATE_REJECTED: &str = "CERTIFICATE_REJECTED";
pub const CODE_FORBIDDEN: &str = "FORBIDDEN";
pub const CODE_CONFLICT: &str = "CONFLICT";
pub const CODE_BAD_REQUEST: &str = "BAD_REQUEST";
pub const CODE_INTERNAL: &str = "INTERNAL";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account disabled")]
    AccountDisabled,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    ExpiredToken,
    #[error("refresh token reuse detected")]
    ReuseDetected,
    #[error("csrf token mismatch")]
    CsrfMismatch,
    #[error("insufficient trust")]
    InsufficientTrust,
    #[error("client certificate rejected")]
    CertificateRejected,
    #[error("forbidden")]
    Forbidden,
    #[error("conflict")]
    Conflict,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Body returned for every rejected request.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials
            | Self::AccountDisabled
            | Self::InvalidToken
            | Self::ExpiredToken
            | Self::ReuseDetected
            | Self::CertificateRejected => StatusCode::UNAUTHORIZED,
            Self::CsrfMismatch | Self::InsufficientTrust | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Conflict => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Token failures collapse into one code so callers cannot tell them apart.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => CODE_INVALID_CREDENTIALS,
            Self::AccountDisabled => CODE_ACCOUNT_DISABLED,
            Self::InvalidToken | Self::ExpiredToken | Self::ReuseDetected => {
                CODE_INVALID_OR_EXPIRED
            }
            Self::CsrfMismatch => CODE_CSRF_MISMATCH,
            Self::InsufficientTrust => CODE_INSUFFICIENT_TRUST,
            Self::CertificateRejected => CODE_CERTIFICATE_REJECTED,
            Self::Forbidden => CODE_FORBIDDEN,
            Self::Conflict => CODE_CONFLICT,
            Self::BadRequest(_) => CODE_BAD_REQUEST,
            Self::Internal(_) => CODE_INTERNAL,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Internal(err) = &self {
            error!("Internal error: {err:#}");
        }
        let body = ErrorBody {
            code: self.code().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
