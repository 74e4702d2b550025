//! # Password-Reset Tokens
//!
//! A reset token is `<selector>.<verifier>`: the selector is a public
//! [`ResetTokenId`] used to look the record up, the verifier is 32 random
//! bytes (base64url). Only the SHA-256 digest of the verifier is stored,
//! and comparison is constant-time.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand_core::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use campus_core::ResetTokenId;

/// SHA-256 digest of a reset-token verifier.
#[derive(Clone, PartialEq, Eq)]
pub struct ResetDigest([u8; 32]);

impl ResetDigest {
    /// Digest a presented verifier string.
    pub fn of_verifier(verifier: &str) -> Self {
        Self(Sha256::digest(verifier.as_bytes()).into())
    }

    /// Rebuild a digest loaded from storage. Returns `None` unless exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    /// Raw digest bytes, for persistence.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Constant-time check of a presented verifier against this digest.
    pub fn matches(&self, verifier: &str) -> bool {
        let presented = Self::of_verifier(verifier);
        self.0[..].ct_eq(&presented.0[..]).into()
    }
}

impl std::fmt::Debug for ResetDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResetDigest({}...)", &crate::bytes_to_hex(&self.0)[..8])
    }
}

/// A newly minted reset token. `token` is the only copy of the plaintext.
pub struct IssuedResetToken {
    /// Lookup selector.
    pub id: ResetTokenId,
    /// `<selector>.<verifier>`, handed to the delivery channel.
    pub token: String,
    /// Digest to persist.
    pub digest: ResetDigest,
}

impl std::fmt::Debug for IssuedResetToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedResetToken")
            .field("id", &self.id)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Mint a fresh reset token from the OS CSPRNG.
pub fn issue() -> IssuedResetToken {
    let mut raw = Zeroizing::new([0u8; 32]);
    rand_core::OsRng.fill_bytes(&mut raw[..]);
    let verifier = URL_SAFE_NO_PAD.encode(&raw[..]);
    let id = ResetTokenId::new();
    IssuedResetToken {
        id,
        digest: ResetDigest::of_verifier(&verifier),
        token: format!("{id}.{verifier}"),
    }
}

/// Split a presented token into selector and verifier.
pub fn parse(token: &str) -> Option<(ResetTokenId, &str)> {
    let (selector, verifier) = token.trim().split_once('.')?;
    if verifier.is_empty() {
        return None;
    }
    let id = uuid::Uuid::parse_str(selector).ok()?;
    Some((ResetTokenId::from_uuid(id), verifier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_parses_and_matches() {
        let issued = issue();
        let (id, verifier) = parse(&issued.token).unwrap();
        assert_eq!(id, issued.id);
        assert!(issued.digest.matches(verifier));
    }

    #[test]
    fn wrong_verifier_does_not_match() {
        let issued = issue();
        let other = issue();
        let (_, other_verifier) = parse(&other.token).unwrap();
        assert!(!issued.digest.matches(other_verifier));
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(issue().token, issue().token);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse("").is_none());
        assert!(parse("no-dot").is_none());
        assert!(parse("not-a-uuid.abc").is_none());
        let id = ResetTokenId::new();
        assert!(parse(&format!("{id}.")).is_none());
    }

    #[test]
    fn digest_round_trips_through_bytes() {
        let issued = issue();
        let restored = ResetDigest::from_slice(issued.digest.as_bytes()).unwrap();
        assert_eq!(restored, issued.digest);
        assert!(ResetDigest::from_slice(&[0u8; 31]).is_none());
    }

    #[test]
    fn debug_redacts_plaintext() {
        let issued = issue();
        let debug = format!("{issued:?}");
        assert!(!debug.contains(&issued.token));
    }
}
