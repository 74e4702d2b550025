//! # Secret Hashing
//!
//! Argon2id hashing of principal secrets, stored as PHC strings
//! (`$argon2id$v=19$m=...,t=...,p=1$<salt>$<hash>`). The PHC string carries
//! its own parameters, so raising the cost later does not invalidate
//! existing hashes.

use std::sync::OnceLock;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use campus_core::{ValidationError, MIN_SECRET_LENGTH};

use crate::error::CryptoError;

/// Default Argon2 memory cost in KiB.
pub const DEFAULT_MEMORY_KIB: u32 = 19_456;

/// Default Argon2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 2;

/// An Argon2id PHC hash string. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretHash(String);

impl SecretHash {
    /// Wrap a PHC string loaded from storage.
    pub fn from_phc(phc: impl Into<String>) -> Self {
        Self(phc.into())
    }

    /// The PHC string, for persistence.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretHash([REDACTED])")
    }
}

/// Reject secrets shorter than [`MIN_SECRET_LENGTH`] characters.
pub fn check_secret_strength(secret: &str) -> Result<(), ValidationError> {
    if secret.chars().count() < MIN_SECRET_LENGTH {
        return Err(ValidationError::SecretTooShort {
            min: MIN_SECRET_LENGTH,
        });
    }
    Ok(())
}

/// Hashes and verifies secrets with a fixed Argon2id cost.
#[derive(Clone)]
pub struct SecretHasher {
    argon2: Argon2<'static>,
    dummy: OnceLock<SecretHash>,
}

impl SecretHasher {
    /// Create a hasher with explicit memory (KiB) and iteration costs.
    pub fn new(memory_kib: u32, iterations: u32) -> Result<Self, CryptoError> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| CryptoError::InvalidHashParams(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            dummy: OnceLock::new(),
        })
    }

    /// Hash a secret under a fresh random salt.
    pub fn hash(&self, secret: &str) -> Result<SecretHash, CryptoError> {
        let salt = SaltString::generate(&mut rand_core::OsRng);
        let phc = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| CryptoError::Hashing(e.to_string()))?;
        Ok(SecretHash(phc.to_string()))
    }

    /// Check `secret` against a stored hash. An unparseable hash never matches.
    pub fn verify(&self, secret: &str, hash: &SecretHash) -> bool {
        match PasswordHash::new(hash.as_str()) {
            Ok(parsed) => self
                .argon2
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Spend the same work as a real verification and always fail.
    ///
    /// Used when the looked-up account does not exist.
    pub fn dummy_verify(&self, secret: &str) -> bool {
        if self.dummy.get().is_none() {
            if let Ok(hash) = self.hash("campus-dummy-secret") {
                let _ = self.dummy.set(hash);
            }
        }
        if let Some(hash) = self.dummy.get() {
            let _ = self.verify(secret, hash);
        }
        false
    }
}

impl Default for SecretHasher {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
            dummy: OnceLock::new(),
        }
    }
}

impl std::fmt::Debug for SecretHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretHasher").finish_non_exhaustive()
    }
}
