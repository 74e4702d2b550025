//! # Bearer Tokens
//!
//! Stateless Ed25519-signed bearer tokens.
//!
//! ## Wire Format
//!
//! ```text
//! v1.<base64url(claims json)>.<base64url(signature)>
//! ```
//!
//! The signature covers the ASCII bytes of `v1.<payload>`. Claims are
//! `{ sub, role, iat, exp }` with Unix-second timestamps.
//!
//! ## Verification Order
//!
//! 1. Structure and encoding (→ [`TokenError::Malformed`]).
//! 2. Signature via `verify_strict` (→ [`TokenError::BadSignature`]).
//! 3. Expiry: the token is valid while `now <= exp` (→ [`TokenError::Expired`]).
//!
//! Expiry is only inspected once the signature has been accepted, so a
//! forged token never learns anything about the clock.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use campus_core::{PrincipalId, Role};

use crate::error::CryptoError;

/// Version tag prefixed to every token.
pub const TOKEN_VERSION: &str = "v1";

/// Default token lifetime (7 days).
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 168;

/// Claims carried by a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Principal the token was issued to.
    pub sub: PrincipalId,
    /// Role of that principal.
    pub role: Role,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds. Inclusive.
    pub exp: i64,
}

/// A freshly issued token and its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The encoded bearer token.
    pub token: String,
    /// When the token stops verifying.
    pub expires_at: DateTime<Utc>,
}

/// Why a presented token was rejected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// The token is not of the form `v1.<payload>.<signature>`.
    #[error("token is malformed")]
    Malformed,
    /// The signature does not verify under the service key.
    #[error("token signature is invalid")]
    BadSignature,
    /// The token verified but its expiry has passed.
    #[error("token has expired")]
    Expired,
}

/// Issues and verifies bearer tokens under a single Ed25519 key.
#[derive(Clone)]
pub struct TokenService {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    ttl: Duration,
}

impl TokenService {
    /// Create a service from a raw 32-byte Ed25519 seed.
    pub fn from_seed(seed: &[u8; 32], ttl: Duration) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
            ttl,
        }
    }

    /// Create a service from a 64-character hex seed.
    pub fn from_hex_seed(hex: &str, ttl: Duration) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(crate::hex_to_bytes(hex)?);
        let seed: Zeroizing<[u8; 32]> =
            Zeroizing::new(bytes.as_slice().try_into().map_err(|_| {
                CryptoError::InvalidSigningKey(format!(
                    "expected 32 bytes (64 hex chars), got {} bytes",
                    bytes.len()
                ))
            })?);
        Ok(Self::from_seed(&seed, ttl))
    }

    /// Generate a service with a random key from the OS CSPRNG.
    ///
    /// Tokens issued by a generated key do not survive a restart.
    pub fn generate(ttl: Duration) -> Self {
        let signing_key = SigningKey::generate(&mut rand_core::OsRng);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
            ttl,
        }
    }

    /// The configured token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `sub` valid from now.
    pub fn issue(&self, sub: PrincipalId, role: Role) -> Result<IssuedToken, CryptoError> {
        self.issue_at(sub, role, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        sub: PrincipalId,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, CryptoError> {
        let expires_at = now + self.ttl;
        let claims = TokenClaims {
            sub,
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signing_input = format!("{TOKEN_VERSION}.{payload}");
        let signature = self.signing_key.sign(signing_input.as_bytes());
        let token = format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        );
        Ok(IssuedToken { token, expires_at })
    }

    /// Verify a token against the current time.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as if the current time were `now`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let mut parts = token.split('.');
        let (version, payload, signature) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(v), Some(p), Some(s), None) => (v, p, s),
                _ => return Err(TokenError::Malformed),
            };
        if version != TOKEN_VERSION || payload.is_empty() {
            return Err(TokenError::Malformed);
        }

        let sig_bytes = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;
        let sig_array: [u8; 64] = sig_bytes
            .as_slice()
            .try_into()
            .map_err(|_| TokenError::Malformed)?;
        let signature = Signature::from_bytes(&sig_array);

        let signing_input = &token[..version.len() + 1 + payload.len()];
        self.verifying_key
            .verify_strict(signing_input.as_bytes(), &signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims_bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: TokenClaims =
            serde_json::from_slice(&claims_bytes).map_err(|_| TokenError::Malformed)?;

        if now.timestamp() > claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let public = crate::bytes_to_hex(self.verifying_key.as_bytes());
        f.debug_struct("TokenService")
            .field("verifying_key", &format!("{}...", &public[..16]))
            .field("ttl_hours", &self.ttl.num_hours())
            .finish()
    }
}
