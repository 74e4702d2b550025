//! # Cryptographic Error Types
//!
//! Infrastructure failures of the crypto layer. Token rejection is not an
//! error of this kind; see [`TokenError`](crate::TokenError).

use thiserror::Error;

/// Errors from cryptographic setup and hashing operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Hex decoding error.
    #[error("hex decode error: {0}")]
    HexDecode(String),

    /// The configured signing key is not a 32-byte Ed25519 seed.
    #[error("invalid signing key: {0}")]
    InvalidSigningKey(String),

    /// Argon2 parameters were rejected.
    #[error("invalid hashing parameters: {0}")]
    InvalidHashParams(String),

    /// Hashing a secret failed.
    #[error("secret hashing failed: {0}")]
    Hashing(String),

    /// Token claims could not be encoded.
    #[error("token encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_signing_key_display() {
        let err = CryptoError::InvalidSigningKey("expected 32 bytes".to_string());
        assert!(format!("{err}").contains("32 bytes"));
    }

    #[test]
    fn hex_decode_display() {
        let err = CryptoError::HexDecode("odd length".to_string());
        assert_eq!(format!("{err}"), "hex decode error: odd length");
    }
}
