//! # Identity Newtypes
//!
//! Identifier newtypes for principals, payment transactions, generated
//! artifacts and password-reset tokens, plus the normalized [`Email`].
//!
//! UUID-based identifiers are always valid by construction. [`Email`] is
//! validated and lowercased at construction time; deserialization goes
//! through the same validation so an invalid address can never be
//! materialized from JSON.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Implements `Deserialize` for a validated string newtype by delegating to
/// its `new` constructor.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Declares a UUID-backed identifier newtype.
macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $ty(Uuid);

        impl $ty {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an identifier from an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $ty {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_identifier!(
    /// Identifier of a principal (student, member, volunteer or admin).
    PrincipalId
);

uuid_identifier!(
    /// Identifier of a claimed payment transaction.
    TransactionId
);

uuid_identifier!(
    /// Identifier of a generated artifact (admit card, membership card, I-card).
    ArtifactId
);

uuid_identifier!(
    /// Public selector half of a password-reset token.
    ResetTokenId
);

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

/// A normalized email address.
///
/// # Validation
///
/// - Surrounding whitespace is trimmed and the address is lowercased.
/// - Exactly one `@`, with a non-empty local part and a domain containing
///   at least one `.` that is neither its first nor last character.
/// - No interior whitespace; at most 254 characters.
///
/// Uniqueness of principals is scoped per role, so two `Email` values are
/// compared only together with a [`Role`](crate::Role).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Email(String);

impl_validating_deserialize!(Email);

impl Email {
    /// Maximum accepted length of an address.
    pub const MAX_LEN: usize = 254;

    /// Normalize and validate an email address.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingField`] for a blank input and
    /// [`ValidationError::InvalidEmail`] for a malformed one.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = value.into();
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ValidationError::MissingField { field: "email" });
        }
        if normalized.len() > Self::MAX_LEN || normalized.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidEmail(raw));
        }

        let mut parts = normalized.split('@');
        let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
            (Some(local), Some(domain), None) => (local, domain),
            _ => return Err(ValidationError::InvalidEmail(raw)),
        };
        if local.is_empty()
            || domain.is_empty()
            || !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
        {
            return Err(ValidationError::InvalidEmail(raw));
        }

        Ok(Self(normalized))
    }

    /// The normalized address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
