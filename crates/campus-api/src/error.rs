//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps domain errors from campus-core, campus-state and the service
//! modules to HTTP status codes with a JSON body of error code, message
//! and optional details. Internal error details never reach the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use campus_core::ValidationError;
use campus_state::{ArtifactError, PrincipalError, TransactionError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::credentials::CredentialError;

/// Structured JSON error response body.
///
/// All error responses use this format. The `details` field carries the
/// offending field name for 422 validation errors and is omitted otherwise.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// A specific request field failed validation (422).
    #[error("{message}")]
    InvalidField {
        /// Field name as it appears in the request body.
        field: &'static str,
        /// Field-specific message.
        message: String,
    },

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Authentication failure: missing, invalid or expired credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authorization failure: wrong role or not the owner (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) | Self::InvalidField { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
            }
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if let Self::Internal(_) = &self {
            tracing::error!(error = %self, "internal server error");
        }

        let details = match &self {
            Self::InvalidField { field, .. } => Some(serde_json::json!({ "field": field })),
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Field-specific validation failures keep the field in `details`.
impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        match err.field() {
            Some(field) => Self::InvalidField {
                field,
                message: err.to_string(),
            },
            None => Self::Validation(err.to_string()),
        }
    }
}

impl From<PrincipalError> for AppError {
    fn from(err: PrincipalError) -> Self {
        match err {
            PrincipalError::Validation(v) => v.into(),
            PrincipalError::AlreadyApproved => Self::Conflict(err.to_string()),
            PrincipalError::WrongRole { .. } | PrincipalError::FeeNotPaid => {
                Self::Validation(err.to_string())
            }
        }
    }
}

impl From<TransactionError> for AppError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::AlreadyResolved { .. } | TransactionError::AlreadyLinked => {
                Self::Conflict(err.to_string())
            }
        }
    }
}

impl From<ArtifactError> for AppError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::Validation(v) => v.into(),
            ArtifactError::Ineligible(_) => Self::Validation(err.to_string()),
            ArtifactError::AlreadyExists { .. } => Self::Conflict(err.to_string()),
        }
    }
}

/// Every credential failure that could reveal whether an account exists
/// collapses to one 401 message.
impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::InvalidCredentials => {
                Self::Unauthorized("invalid email or password".to_string())
            }
            CredentialError::InvalidResetToken | CredentialError::ExpiredResetToken => {
                Self::Unauthorized("invalid or expired reset token".to_string())
            }
            CredentialError::DuplicateEmail { .. } | CredentialError::RollNumberTaken(_) => {
                Self::Conflict(err.to_string())
            }
            CredentialError::NotSelfService(_) => Self::Forbidden(err.to_string()),
            CredentialError::NotFound(_) => Self::NotFound(err.to_string()),
            CredentialError::Validation(v) => v.into(),
            CredentialError::Principal(p) => p.into(),
            CredentialError::Crypto(_) | CredentialError::Persistence(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}
