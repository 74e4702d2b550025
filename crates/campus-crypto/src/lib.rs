//! # campus-crypto — Cryptographic Primitives for the Campus Portal
//!
//! This crate provides the cryptographic building blocks used by the API:
//!
//! - **Bearer tokens** ([`token`]): stateless Ed25519-signed tokens carrying
//!   `{ sub, role, iat, exp }`. Verification checks the signature before
//!   the expiry so forged and expired tokens fail the same way.
//! - **Secret hashing** ([`password`]): Argon2id PHC strings, plus a dummy
//!   verification for unknown accounts so login timing does not reveal
//!   whether an email is registered.
//! - **Reset tokens** ([`reset`]): a public selector plus a random verifier
//!   whose SHA-256 digest is the only thing ever stored. Digests are
//!   compared in constant time.
//!
//! ## Key Material
//!
//! Signing keys are never serialized or logged. [`TokenService`] implements
//! `Debug` by printing only the public key prefix.

pub mod error;
pub mod password;
pub mod reset;
pub mod token;

pub use error::CryptoError;
pub use password::{SecretHash, SecretHasher};
pub use reset::{IssuedResetToken, ResetDigest};
pub use token::{IssuedToken, TokenClaims, TokenError, TokenService};

/// Decode a hex string into bytes.
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, CryptoError> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return Err(CryptoError::HexDecode(format!(
            "hex string has odd length: {}",
            hex.len()
        )));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CryptoError::HexDecode(format!("invalid hex at position {i}")))
        })
        .collect()
}

/// Render bytes as a lowercase hex string.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
