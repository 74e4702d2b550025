//! # Credential Store
//!
//! Registration, login and password reset for every role, plus the admin
//! mutations on principal records. One implementation serves all four
//! roles; the role is a parameter, never a separate code path.
//!
//! ## Enumeration resistance
//!
//! - Login with an unknown email runs a dummy Argon2id verification and
//!   fails with the same [`CredentialError::InvalidCredentials`] as a wrong
//!   secret.
//! - A reset request succeeds identically whether or not the email is
//!   registered; only a registered email gets a token.
//!
//! Argon2id runs on the blocking pool so a burst of logins cannot stall the
//! async executor.

use campus_core::{Email, PrincipalId, Role, ValidationError};
use campus_crypto::password::check_secret_strength;
use campus_crypto::{reset, CryptoError, SecretHash, SecretHasher};
use campus_state::{Principal, PrincipalError, Registration};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::state::{AppState, ResetTokenRecord};

/// Errors from credential and principal operations.
#[derive(Error, Debug)]
pub enum CredentialError {
    /// The email is already registered for this role.
    #[error("a {role} with this email is already registered")]
    DuplicateEmail {
        /// Role the email is registered under.
        role: Role,
    },

    /// Unknown email or wrong secret. Deliberately indistinguishable.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The reset token is malformed, unknown, already used or does not match.
    #[error("invalid reset token")]
    InvalidResetToken,

    /// The reset token was genuine but is past its expiry.
    #[error("reset token has expired")]
    ExpiredResetToken,

    /// Self-registration is not open for this role.
    #[error("{0} accounts cannot be self-registered")]
    NotSelfService(Role),

    /// No principal with this id.
    #[error("principal {0} not found")]
    NotFound(PrincipalId),

    /// Another student already holds this roll number.
    #[error("roll number {0} is already assigned")]
    RollNumberTaken(String),

    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The principal rejected the mutation.
    #[error(transparent)]
    Principal(#[from] PrincipalError),

    /// Secret hashing failed.
    #[error("secret hashing failed: {0}")]
    Crypto(#[from] CryptoError),

    /// The in-memory change succeeded but could not be written through.
    #[error("{0}")]
    Persistence(String),
}

// ── Reset delivery ──────────────────────────────────────────────────

/// Hands a plaintext reset token to the principal.
///
/// The token is never stored; this is its only consumer.
pub trait ResetDelivery: Send + Sync + std::fmt::Debug {
    /// Deliver `token` to `principal`.
    fn deliver(&self, principal: &Principal, token: &str, expires_at: DateTime<Utc>);
}

/// Writes reset tokens to the debug log. E-mail delivery is external.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDelivery;

impl ResetDelivery for LogDelivery {
    fn deliver(&self, principal: &Principal, token: &str, expires_at: DateTime<Utc>) {
        tracing::debug!(
            principal_id = %principal.id,
            role = %principal.role(),
            email = %principal.email,
            reset_token = %token,
            expires_at = %expires_at,
            "password reset token issued"
        );
    }
}

/// What a reset request reports, identical for known and unknown emails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetRequestOutcome {
    pub message: &'static str,
}

impl ResetRequestOutcome {
    /// The only outcome.
    pub const ACCEPTED: Self = Self {
        message: "If an account with that email exists, a password reset link has been sent.",
    };
}

// ── Hashing on the blocking pool ────────────────────────────────────

async fn hash_secret(
    hasher: &SecretHasher,
    secret: Zeroizing<String>,
) -> Result<SecretHash, CredentialError> {
    let hasher = hasher.clone();
    tokio::task::spawn_blocking(move || hasher.hash(&secret))
        .await
        .map_err(|e| CryptoError::Hashing(format!("hashing task failed: {e}")))?
        .map_err(CredentialError::from)
}

/// Verify against `hash`, or run a dummy verification when there is none.
async fn verify_secret(
    hasher: &SecretHasher,
    secret: Zeroizing<String>,
    hash: Option<SecretHash>,
) -> bool {
    let hasher = hasher.clone();
    tokio::task::spawn_blocking(move || match hash {
        Some(hash) => hasher.verify(&secret, &hash),
        None => hasher.dummy_verify(&secret),
    })
    .await
    .unwrap_or(false)
}

async fn persist_principal(state: &AppState, principal: &Principal) -> Result<(), CredentialError> {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::principals::update(pool, principal).await {
            tracing::error!(principal_id = %principal.id, error = %e, "failed to persist principal update");
            return Err(CredentialError::Persistence(
                "principal updated in-memory but database persist failed".to_string(),
            ));
        }
    }
    Ok(())
}

// ── Registration ────────────────────────────────────────────────────

/// Self-service registration for students, members and volunteers.
pub async fn register(
    state: &AppState,
    registration: Registration,
) -> Result<Principal, CredentialError> {
    if !registration.role.is_self_service() {
        return Err(CredentialError::NotSelfService(registration.role));
    }
    create(state, registration).await
}

/// Create a student on behalf of an admin. Same validation as self-service.
pub async fn admin_create_student(
    state: &AppState,
    mut registration: Registration,
    admin: PrincipalId,
) -> Result<Principal, CredentialError> {
    registration.role = Role::Student;
    let principal = create(state, registration).await?;
    tracing::info!(
        principal_id = %principal.id,
        admin_id = %admin,
        "student created by admin"
    );
    Ok(principal)
}

/// Create the configured admin unless an admin with that email exists.
///
/// Returns `None` when nothing was created.
pub async fn bootstrap_admin(
    state: &AppState,
    email: &str,
    secret: &str,
    name: &str,
) -> Result<Option<Principal>, CredentialError> {
    let normalized = Email::new(email)?;
    if state
        .principals
        .find_by_email(Role::Admin, &normalized)
        .is_some()
    {
        tracing::debug!(email = %normalized, "bootstrap admin already exists");
        return Ok(None);
    }
    let registration = Registration {
        role: Role::Admin,
        email: email.to_string(),
        secret: secret.to_string(),
        name: name.to_string(),
        phone: None,
        address: None,
        city: None,
        class_name: None,
    };
    match create(state, registration).await {
        Ok(principal) => Ok(Some(principal)),
        Err(CredentialError::DuplicateEmail { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn create(state: &AppState, registration: Registration) -> Result<Principal, CredentialError> {
    let (validated, secret) = registration.validate()?;
    let secret = Zeroizing::new(secret);
    let role = validated.role;

    // Cheap early rejection; the authoritative check repeats under the lock.
    if state
        .principals
        .find_by_email(role, &validated.email)
        .is_some()
    {
        return Err(CredentialError::DuplicateEmail { role });
    }

    let secret_hash = hash_secret(&state.hasher, secret).await?;
    let created = state
        .principals
        .create(validated, secret_hash, Utc::now())?;
    let principal = created.principal;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::principals::insert(pool, &principal, created.sequence).await {
            state.principals.discard(&principal.id);
            tracing::error!(principal_id = %principal.id, error = %e, "failed to persist principal");
            return Err(CredentialError::Persistence(
                "principal database persist failed".to_string(),
            ));
        }
    }

    tracing::info!(
        principal_id = %principal.id,
        role = %role,
        identifier = %principal.identifier(),
        "principal registered"
    );
    Ok(principal)
}

// ── Login ───────────────────────────────────────────────────────────

/// Verify a principal's secret. Pending volunteer approval does not block login.
pub async fn authenticate(
    state: &AppState,
    role: Role,
    email: &str,
    secret: Zeroizing<String>,
) -> Result<Principal, CredentialError> {
    let principal = Email::new(email)
        .ok()
        .and_then(|e| state.principals.find_by_email(role, &e));
    let hash = principal.as_ref().map(|p| p.secret_hash.clone());

    let verified = verify_secret(&state.hasher, secret, hash).await;
    match principal {
        Some(principal) if verified => {
            tracing::info!(principal_id = %principal.id, role = %role, "principal authenticated");
            Ok(principal)
        }
        _ => {
            tracing::warn!(role = %role, "authentication failed: invalid credentials");
            Err(CredentialError::InvalidCredentials)
        }
    }
}

// ── Password reset ──────────────────────────────────────────────────

/// Start a password reset. Succeeds identically for unknown emails.
pub async fn reset_secret_request(
    state: &AppState,
    role: Role,
    email: &str,
) -> Result<ResetRequestOutcome, CredentialError> {
    let principal = Email::new(email)
        .ok()
        .and_then(|e| state.principals.find_by_email(role, &e));

    let Some(principal) = principal else {
        tracing::debug!(role = %role, "password reset requested for unknown email");
        return Ok(ResetRequestOutcome::ACCEPTED);
    };

    let issued = reset::issue();
    let now = Utc::now();
    let record = ResetTokenRecord {
        id: issued.id,
        principal_id: principal.id,
        digest: issued.digest.clone(),
        created_at: now,
        expires_at: now + Duration::hours(state.config.reset_ttl_hours),
    };
    let displaced = state.reset_tokens.issue(record.clone(), now);

    if let Some(pool) = &state.db_pool {
        let persisted = match crate::db::reset_tokens::delete_many(pool, &displaced).await {
            Ok(_) => crate::db::reset_tokens::insert(pool, &record).await,
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            state.reset_tokens.take(&record.id);
            tracing::error!(principal_id = %principal.id, error = %e, "failed to persist reset token");
            return Err(CredentialError::Persistence(
                "reset token database persist failed".to_string(),
            ));
        }
    }

    state
        .reset_delivery
        .deliver(&principal, &issued.token, record.expires_at);
    tracing::info!(principal_id = %principal.id, role = %role, "password reset requested");
    Ok(ResetRequestOutcome::ACCEPTED)
}

/// Complete a password reset.
///
/// The token is consumed before any other check, so it is single-use even
/// when the new secret is rejected.
pub async fn reset_secret_confirm(
    state: &AppState,
    token: &str,
    new_secret: Zeroizing<String>,
) -> Result<Principal, CredentialError> {
    let (id, verifier) = reset::parse(token).ok_or(CredentialError::InvalidResetToken)?;
    let record = state
        .reset_tokens
        .take(&id)
        .ok_or(CredentialError::InvalidResetToken)?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::reset_tokens::delete(pool, id).await {
            tracing::error!(principal_id = %record.principal_id, error = %e, "failed to consume reset token in database");
            return Err(CredentialError::Persistence(
                "reset token consumed in-memory but database persist failed".to_string(),
            ));
        }
    }

    if !record.digest.matches(verifier) {
        tracing::warn!(principal_id = %record.principal_id, "password reset failed: verifier mismatch");
        return Err(CredentialError::InvalidResetToken);
    }
    let now = Utc::now();
    if record.is_expired_at(now) {
        tracing::warn!(principal_id = %record.principal_id, "password reset failed: token expired");
        return Err(CredentialError::ExpiredResetToken);
    }
    check_secret_strength(&new_secret)?;

    let secret_hash = hash_secret(&state.hasher, new_secret).await?;
    let principal = state
        .principals
        .try_update(&record.principal_id, |p| {
            p.set_secret_hash(secret_hash, now);
            Ok::<_, CredentialError>(p.clone())
        })
        .ok_or(CredentialError::NotFound(record.principal_id))??;
    persist_principal(state, &principal).await?;

    let revoked = state.reset_tokens.revoke_principal(principal.id);
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::reset_tokens::delete_for_principal(pool, principal.id).await {
            tracing::error!(principal_id = %principal.id, error = %e, "failed to revoke reset tokens in database");
            return Err(CredentialError::Persistence(
                "reset tokens revoked in-memory but database persist failed".to_string(),
            ));
        }
    }

    tracing::info!(
        principal_id = %principal.id,
        role = %principal.role(),
        revoked_tokens = revoked.len(),
        "password reset completed"
    );
    Ok(principal)
}

// ── Admin mutations ─────────────────────────────────────────────────

/// Approve a pending volunteer.
pub async fn approve_volunteer(
    state: &AppState,
    id: PrincipalId,
    admin: PrincipalId,
) -> Result<Principal, CredentialError> {
    let now = Utc::now();
    let principal = state
        .principals
        .try_update(&id, |p| {
            p.approve_volunteer(admin, now)?;
            Ok::<_, CredentialError>(p.clone())
        })
        .ok_or(CredentialError::NotFound(id))??;
    persist_principal(state, &principal).await?;
    tracing::info!(principal_id = %id, admin_id = %admin, "volunteer approved");
    Ok(principal)
}

/// Set a student's fee tier and amount due.
pub async fn assign_fee_level(
    state: &AppState,
    id: PrincipalId,
    level: &str,
    amount: i64,
) -> Result<Principal, CredentialError> {
    let now = Utc::now();
    let principal = state
        .principals
        .try_update(&id, |p| {
            p.assign_fee_level(level, amount, now)?;
            Ok::<_, CredentialError>(p.clone())
        })
        .ok_or(CredentialError::NotFound(id))??;
    persist_principal(state, &principal).await?;
    tracing::info!(principal_id = %id, fee_level = %level, fee_amount = amount, "fee level assigned");
    Ok(principal)
}

/// Assign a student's roll number. Requires the fee to be paid.
pub async fn assign_roll_number(
    state: &AppState,
    id: PrincipalId,
    roll_number: &str,
) -> Result<Principal, CredentialError> {
    let principal = state
        .principals
        .assign_roll_number(&id, roll_number, Utc::now())?;
    persist_principal(state, &principal).await?;
    tracing::info!(principal_id = %id, roll_number = %roll_number.trim(), "roll number assigned");
    Ok(principal)
}

/// All principals of a role, in registration order.
pub fn list_principals(state: &AppState, role: Role) -> Vec<Principal> {
    state.principals.list_role(role)
}
