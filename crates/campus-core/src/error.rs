//! # Validation Errors
//!
//! Structured input-validation errors built with `thiserror`. Every variant
//! names the field it concerns so that the HTTP layer can return a
//! field-specific message without string parsing.

use thiserror::Error;

/// Input failed validation. Recoverable by the caller correcting the input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was absent or blank.
    #[error("{field} is required")]
    MissingField {
        /// The field name as it appears in the request body.
        field: &'static str,
    },

    /// The secret is shorter than the accepted minimum.
    #[error("password must be at least {min} characters")]
    SecretTooShort {
        /// The minimum accepted length.
        min: usize,
    },

    /// The email address is not of the form `local@domain`.
    #[error("invalid email address: \"{0}\"")]
    InvalidEmail(String),

    /// A role name did not match any known role.
    #[error("unknown role: \"{0}\" (expected student, member, volunteer or admin)")]
    UnknownRole(String),

    /// A numeric amount was zero or negative.
    #[error("{field} must be greater than 0")]
    NonPositiveAmount {
        /// The field name.
        field: &'static str,
    },

    /// A field value is present but not acceptable.
    #[error("invalid {field}: {reason}")]
    InvalidValue {
        /// The field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ValidationError {
    /// The request field this error concerns, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::MissingField { field }
            | Self::NonPositiveAmount { field }
            | Self::InvalidValue { field, .. } => Some(*field),
            Self::SecretTooShort { .. } => Some("password"),
            Self::InvalidEmail(_) => Some("email"),
            Self::UnknownRole(_) => Some("role"),
        }
    }
}

/// Require that an optional string field is present and not blank,
/// returning the trimmed value.
pub fn require_field(
    value: Option<&str>,
    field: &'static str,
) -> Result<String, ValidationError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ValidationError::MissingField { field }),
    }
}
