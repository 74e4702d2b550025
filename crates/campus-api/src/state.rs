//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Architecture
//!
//! The in-memory stores are authoritative for the running process. When a
//! database pool is configured, every mutation is written through to
//! Postgres and the stores are hydrated from it on startup.
//!
//! Every uniqueness rule is enforced under a single write lock:
//!
//! - **Principals**: `(role, email)` index, per-role identifier counters and
//!   the roll-number index live in one [`PrincipalStore`] table.
//! - **Ledger**: approve/reject is a compare-and-set on `status` inside
//!   [`Store::try_update`].
//! - **Artifacts**: the `(principal, kind, context)` key index lives in the
//!   same table as the artifacts in [`ArtifactRegistry`].
//!
//! Lock order when two stores are held at once: ledger, then principals.
//! No lock is ever held across an `.await`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use campus_core::{ArtifactId, Email, PrincipalId, ResetTokenId, Role, TransactionId};
use campus_crypto::{CryptoError, ResetDigest, SecretHash, SecretHasher, TokenService};
use campus_state::principal::format_identifier;
use campus_state::{
    Artifact, ArtifactError, ArtifactKey, ArtifactKind, PaymentTransaction, Principal,
    ValidatedRegistration,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use sqlx::PgPool;
use thiserror::Error;

use crate::config::AppConfig;
use crate::credentials::{CredentialError, LogDelivery, ResetDelivery};

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory key-value store.
///
/// All operations are synchronous (the RwLock is `parking_lot`, not
/// `tokio::sync`) because the lock is never held across `.await` points.
#[derive(Debug)]
pub struct Store<K, T> {
    data: Arc<RwLock<HashMap<K, T>>>,
}

impl<K, T> Clone for Store<K, T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<K: Copy + Eq + Hash, T: Clone> Store<K, T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: K, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    /// Retrieve a record by ID.
    pub fn get(&self, id: &K) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    /// List all records.
    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    /// Atomically read-validate-update a record.
    ///
    /// The closure may inspect the current state, validate preconditions,
    /// mutate the record and return `Ok(R)` or `Err(E)`. The whole operation
    /// runs under one write lock, so no other writer can interleave between
    /// the check and the mutation.
    ///
    /// Returns `None` if the record doesn't exist.
    pub fn try_update<R, E>(
        &self,
        id: &K,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.data.write().get_mut(id).map(f)
    }

    /// Remove a record by ID.
    pub fn remove(&self, id: &K) -> Option<T> {
        self.data.write().remove(id)
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Copy + Eq + Hash, T: Clone> Default for Store<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// All payment transactions, keyed by id.
pub type Ledger = Store<TransactionId, PaymentTransaction>;

// -- Principals ---------------------------------------------------------------

#[derive(Debug, Default)]
struct PrincipalTable {
    by_id: HashMap<PrincipalId, Principal>,
    by_email: HashMap<(Role, Email), PrincipalId>,
    roll_numbers: HashMap<String, PrincipalId>,
    counters: HashMap<Role, u64>,
    order: Vec<PrincipalId>,
}

impl PrincipalTable {
    fn index(&mut self, principal: Principal) {
        let id = principal.id;
        self.by_email
            .insert((principal.role(), principal.email.clone()), id);
        if let Some(roll) = principal.as_student().and_then(|s| s.roll_number.clone()) {
            self.roll_numbers.insert(roll, id);
        }
        if self.by_id.insert(id, principal).is_none() {
            self.order.push(id);
        }
    }
}

/// A principal created by [`PrincipalStore::create`] together with the
/// counter value its identifier was derived from.
#[derive(Debug, Clone)]
pub struct CreatedPrincipal {
    /// The inserted principal.
    pub principal: Principal,
    /// Per-role counter value behind `principal`'s identifier.
    pub sequence: u64,
}

/// All principals, with the per-role email index, the identifier counters
/// and the roll-number index guarded by one lock.
#[derive(Debug, Clone, Default)]
pub struct PrincipalStore {
    table: Arc<RwLock<PrincipalTable>>,
}

impl PrincipalStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check email uniqueness, take the next identifier for the role and
    /// insert the principal, all under one write lock.
    pub fn create(
        &self,
        registration: ValidatedRegistration,
        secret_hash: SecretHash,
        now: DateTime<Utc>,
    ) -> Result<CreatedPrincipal, CredentialError> {
        let role = registration.role;
        let mut table = self.table.write();
        if table
            .by_email
            .contains_key(&(role, registration.email.clone()))
        {
            return Err(CredentialError::DuplicateEmail { role });
        }
        let counter = table.counters.entry(role).or_insert(0);
        *counter += 1;
        let sequence = *counter;
        let principal =
            registration.into_principal(format_identifier(role, sequence), secret_hash, now);
        table.index(principal.clone());
        Ok(CreatedPrincipal {
            principal,
            sequence,
        })
    }

    /// Remove a principal created by [`Self::create`] whose persistence
    /// failed, along with its email and roll-number index entries. The
    /// identifier counter is not rewound.
    pub fn discard(&self, id: &PrincipalId) -> Option<Principal> {
        let mut table = self.table.write();
        let principal = table.by_id.remove(id)?;
        let key = (principal.role(), principal.email.clone());
        if table.by_email.get(&key) == Some(id) {
            table.by_email.remove(&key);
        }
        if let Some(roll) = principal.as_student().and_then(|s| s.roll_number.as_ref()) {
            if table.roll_numbers.get(roll) == Some(id) {
                table.roll_numbers.remove(roll);
            }
        }
        table.order.retain(|other| other != id);
        Some(principal)
    }

    /// Load a persisted principal. Registration order follows call order.
    pub fn restore(&self, principal: Principal) {
        self.table.write().index(principal);
    }

    /// Raise a role's identifier counter to at least `value`.
    pub fn restore_counter(&self, role: Role, value: u64) {
        let mut table = self.table.write();
        let counter = table.counters.entry(role).or_insert(0);
        *counter = (*counter).max(value);
    }

    /// Retrieve a principal by ID.
    pub fn get(&self, id: &PrincipalId) -> Option<Principal> {
        self.table.read().by_id.get(id).cloned()
    }

    /// Look up a principal by role and normalized email.
    pub fn find_by_email(&self, role: Role, email: &Email) -> Option<Principal> {
        let table = self.table.read();
        table
            .by_email
            .get(&(role, email.clone()))
            .and_then(|id| table.by_id.get(id))
            .cloned()
    }

    /// All principals of a role, in registration order.
    pub fn list_role(&self, role: Role) -> Vec<Principal> {
        let table = self.table.read();
        table
            .order
            .iter()
            .filter_map(|id| table.by_id.get(id))
            .filter(|p| p.role() == role)
            .cloned()
            .collect()
    }

    /// Number of principals per role.
    pub fn count_by_role(&self) -> HashMap<Role, usize> {
        let table = self.table.read();
        let mut counts = HashMap::new();
        for principal in table.by_id.values() {
            *counts.entry(principal.role()).or_insert(0) += 1;
        }
        counts
    }

    /// Atomically read-validate-update a principal.
    ///
    /// The closure must not change the principal's email or roll number;
    /// those go through [`PrincipalStore::assign_roll_number`].
    pub fn try_update<R, E>(
        &self,
        id: &PrincipalId,
        f: impl FnOnce(&mut Principal) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.table.write().by_id.get_mut(id).map(f)
    }

    /// Assign a student's roll number, rejecting one held by another student.
    pub fn assign_roll_number(
        &self,
        id: &PrincipalId,
        roll_number: &str,
        now: DateTime<Utc>,
    ) -> Result<Principal, CredentialError> {
        let roll_number = roll_number.trim().to_string();
        let mut table = self.table.write();
        if let Some(holder) = table.roll_numbers.get(&roll_number) {
            if holder != id {
                return Err(CredentialError::RollNumberTaken(roll_number));
            }
        }
        let principal = table
            .by_id
            .get_mut(id)
            .ok_or(CredentialError::NotFound(*id))?;
        let previous = principal.as_student().and_then(|s| s.roll_number.clone());
        principal.assign_roll_number(&roll_number, now)?;
        let updated = principal.clone();
        if let Some(previous) = previous {
            table.roll_numbers.remove(&previous);
        }
        table.roll_numbers.insert(roll_number, *id);
        Ok(updated)
    }
}

// -- Artifacts ----------------------------------------------------------------

#[derive(Debug, Default)]
struct ArtifactTable {
    by_id: HashMap<ArtifactId, Artifact>,
    by_key: HashMap<ArtifactKey, ArtifactId>,
}

/// Generated artifacts with their uniqueness index.
#[derive(Debug, Clone, Default)]
pub struct ArtifactRegistry {
    table: Arc<RwLock<ArtifactTable>>,
}

impl ArtifactRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an artifact unless one with the same key exists.
    pub fn insert_unique(&self, artifact: Artifact) -> Result<(), ArtifactError> {
        let mut table = self.table.write();
        let key = artifact.key();
        if table.by_key.contains_key(&key) {
            return Err(ArtifactError::AlreadyExists { kind: key.kind });
        }
        table.by_key.insert(key, artifact.id);
        table.by_id.insert(artifact.id, artifact);
        Ok(())
    }

    /// Whether an artifact with this key exists.
    pub fn contains_key(&self, key: &ArtifactKey) -> bool {
        self.table.read().by_key.contains_key(key)
    }

    /// Remove an artifact and its key.
    pub fn remove(&self, id: &ArtifactId) -> Option<Artifact> {
        let mut table = self.table.write();
        let artifact = table.by_id.remove(id)?;
        table.by_key.remove(&artifact.key());
        Some(artifact)
    }

    /// A principal's artifacts, newest first.
    pub fn for_principal(&self, principal_id: PrincipalId) -> Vec<Artifact> {
        let mut artifacts: Vec<Artifact> = self
            .table
            .read()
            .by_id
            .values()
            .filter(|a| a.principal_id == principal_id)
            .cloned()
            .collect();
        artifacts.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        artifacts
    }

    /// Number of artifacts per kind.
    pub fn count_by_kind(&self) -> HashMap<ArtifactKind, usize> {
        let table = self.table.read();
        let mut counts = HashMap::new();
        for artifact in table.by_id.values() {
            *counts.entry(artifact.kind).or_insert(0) += 1;
        }
        counts
    }
}

// -- Reset Tokens -------------------------------------------------------------

/// Outstanding reset tokens one principal may hold. Issuing another evicts
/// the oldest.
pub const MAX_RESET_TOKENS_PER_PRINCIPAL: usize = 3;

/// Store size at which expired tokens are swept on insert.
const RESET_SWEEP_THRESHOLD: usize = 1_024;

/// An outstanding password-reset token. Only the verifier digest is kept.
#[derive(Debug, Clone)]
pub struct ResetTokenRecord {
    /// Public half of the token, used for lookup.
    pub id: ResetTokenId,
    /// Principal whose secret the token may reset.
    pub principal_id: PrincipalId,
    /// Digest of the secret verifier half.
    pub digest: ResetDigest,
    /// When the token was issued.
    pub created_at: DateTime<Utc>,
    /// When the token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

impl ResetTokenRecord {
    /// Whether the token is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Outstanding reset tokens.
///
/// Bounded two ways under one write lock: expired records are swept once
/// the store reaches [`RESET_SWEEP_THRESHOLD`], and each principal holds at
/// most [`MAX_RESET_TOKENS_PER_PRINCIPAL`] tokens.
#[derive(Debug, Clone, Default)]
pub struct ResetTokenStore {
    table: Arc<RwLock<HashMap<ResetTokenId, ResetTokenRecord>>>,
}

impl ResetTokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a loaded record without sweeping or eviction.
    pub fn restore(&self, record: ResetTokenRecord) {
        self.table.write().insert(record.id, record);
    }

    /// Insert a newly issued token. Returns the ids removed to make room,
    /// expired or evicted, so the caller can delete them from the database.
    pub fn issue(&self, record: ResetTokenRecord, now: DateTime<Utc>) -> Vec<ResetTokenId> {
        let mut table = self.table.write();
        let mut removed = Vec::new();

        if table.len() >= RESET_SWEEP_THRESHOLD {
            table.retain(|id, r| {
                let keep = !r.is_expired_at(now);
                if !keep {
                    removed.push(*id);
                }
                keep
            });
        }

        let mut held: Vec<(DateTime<Utc>, ResetTokenId)> = table
            .values()
            .filter(|r| r.principal_id == record.principal_id)
            .map(|r| (r.created_at, r.id))
            .collect();
        held.sort();
        let excess = (held.len() + 1).saturating_sub(MAX_RESET_TOKENS_PER_PRINCIPAL);
        for (_, id) in held.into_iter().take(excess) {
            table.remove(&id);
            removed.push(id);
        }

        table.insert(record.id, record);
        removed
    }

    /// Remove and return a token. Each token can be taken once.
    pub fn take(&self, id: &ResetTokenId) -> Option<ResetTokenRecord> {
        self.table.write().remove(id)
    }

    /// Remove every token held by `principal_id`, returning their ids.
    pub fn revoke_principal(&self, principal_id: PrincipalId) -> Vec<ResetTokenId> {
        let mut table = self.table.write();
        let ids: Vec<ResetTokenId> = table
            .values()
            .filter(|r| r.principal_id == principal_id)
            .map(|r| r.id)
            .collect();
        for id in &ids {
            table.remove(id);
        }
        ids
    }

    /// Tokens currently held by `principal_id`.
    pub fn held_by(&self, principal_id: PrincipalId) -> usize {
        self.table
            .read()
            .values()
            .filter(|r| r.principal_id == principal_id)
            .count()
    }

    /// Update a record in place. Returns `None` if absent.
    pub fn try_update<R, E>(
        &self,
        id: &ResetTokenId,
        f: impl FnOnce(&mut ResetTokenRecord) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.table.write().get_mut(id).map(f)
    }

    /// Number of outstanding tokens.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Whether no tokens are outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// -- Application State --------------------------------------------------------

/// Failure building [`AppState`] from configuration.
#[derive(Error, Debug)]
pub enum StateInitError {
    /// `CAMPUS_TOKEN_KEY_HEX` is not a 32-byte hex seed.
    #[error("CAMPUS_TOKEN_KEY_HEX is invalid: {0}")]
    TokenKey(CryptoError),

    /// The Argon2id cost parameters are out of range.
    #[error("secret hashing parameters are invalid: {0}")]
    HashParams(CryptoError),
}

/// Shared application state accessible to all route handlers.
///
/// Clone-friendly via `Arc` internals in each store.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Principals of every role.
    pub principals: PrincipalStore,
    /// Payment transactions.
    pub ledger: Ledger,
    /// Generated admit cards and membership/identity cards.
    pub artifacts: ArtifactRegistry,
    /// Outstanding password-reset tokens.
    pub reset_tokens: ResetTokenStore,

    /// Bearer token issuer and verifier.
    pub tokens: TokenService,
    /// Whether `tokens` was generated at startup rather than configured.
    pub token_key_ephemeral: bool,
    /// Argon2id hasher for principal secrets.
    pub hasher: SecretHasher,
    /// Where plaintext reset tokens are handed off.
    pub reset_delivery: Arc<dyn ResetDelivery>,

    /// PostgreSQL pool for write-through persistence. `None` runs in-memory only.
    pub db_pool: Option<PgPool>,

    /// Configuration the state was built from.
    pub config: AppConfig,
}

impl AppState {
    /// Build state from configuration and an optional database pool.
    pub fn try_with_config(
        config: AppConfig,
        db_pool: Option<PgPool>,
    ) -> Result<Self, StateInitError> {
        let ttl = Duration::hours(config.token_ttl_hours);
        let (tokens, token_key_ephemeral) = match &config.token_key_hex {
            Some(hex) => (
                TokenService::from_hex_seed(hex, ttl).map_err(StateInitError::TokenKey)?,
                false,
            ),
            None => {
                tracing::warn!(
                    "CAMPUS_TOKEN_KEY_HEX not set, generating ephemeral key. \
                     Issued tokens will not verify after restart."
                );
                (TokenService::generate(ttl), true)
            }
        };
        let hasher = SecretHasher::new(config.hash_memory_kib, config.hash_iterations)
            .map_err(StateInitError::HashParams)?;

        Ok(Self {
            principals: PrincipalStore::new(),
            ledger: Store::new(),
            artifacts: ArtifactRegistry::new(),
            reset_tokens: ResetTokenStore::new(),
            tokens,
            token_key_ephemeral,
            hasher,
            reset_delivery: Arc::new(LogDelivery),
            db_pool,
            config,
        })
    }

    /// Replace the reset-token delivery channel.
    pub fn with_reset_delivery(mut self, delivery: Arc<dyn ResetDelivery>) -> Self {
        self.reset_delivery = delivery;
        self
    }

    /// Hydrate in-memory stores from the database.
    ///
    /// Called once on startup when a database pool is available.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let pool = match &self.db_pool {
            Some(pool) => pool,
            None => return Ok(()),
        };

        let principals = crate::db::principals::load_all(pool)
            .await
            .map_err(|e| format!("failed to load principals: {e}"))?;
        let principal_count = principals.len();
        for principal in principals {
            self.principals.restore(principal);
        }
        let counters = crate::db::principals::load_counters(pool)
            .await
            .map_err(|e| format!("failed to load identifier counters: {e}"))?;
        for (role, value) in counters {
            self.principals.restore_counter(role, value);
        }

        let transactions = crate::db::transactions::load_all(pool)
            .await
            .map_err(|e| format!("failed to load payment transactions: {e}"))?;
        let transaction_count = transactions.len();
        for tx in transactions {
            self.ledger.insert(tx.id, tx);
        }

        let artifacts = crate::db::artifacts::load_all(pool)
            .await
            .map_err(|e| format!("failed to load artifacts: {e}"))?;
        let artifact_count = artifacts.len();
        for artifact in artifacts {
            if let Err(e) = self.artifacts.insert_unique(artifact) {
                tracing::warn!(error = %e, "duplicate artifact key in database, skipping");
            }
        }

        let reset_tokens = crate::db::reset_tokens::load_active(pool, Utc::now())
            .await
            .map_err(|e| format!("failed to load reset tokens: {e}"))?;
        for record in reset_tokens {
            self.reset_tokens.restore(record);
        }

        tracing::info!(
            principals = principal_count,
            payment_transactions = transaction_count,
            artifacts = artifact_count,
            reset_tokens = self.reset_tokens.len(),
            "Hydrated in-memory stores from database"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_state::{
        ArtifactParams, ExamParams, PaymentStatus, Registration,
    };
    use chrono::NaiveDate;

    fn registration(role: Role, email: &str) -> ValidatedRegistration {
        Registration {
            role,
            email: email.to_string(),
            secret: "s3cret!".to_string(),
            name: "Asha".to_string(),
            phone: None,
            address: None,
            city: None,
            class_name: Some("Class 10".to_string()),
        }
        .validate()
        .unwrap()
        .0
    }

    fn hash() -> SecretHash {
        SecretHash::from_phc("$argon2id$test")
    }

    // ── Store ────────────────────────────────────────────────────

    #[test]
    fn store_insert_get_remove() {
        let store: Store<TransactionId, u32> = Store::new();
        let id = TransactionId::new();
        assert!(store.is_empty());
        assert!(store.insert(id, 1).is_none());
        assert_eq!(store.insert(id, 2), Some(1));
        assert_eq!(store.get(&id), Some(2));
        assert_eq!(store.len(), 1);
        assert_eq!(store.remove(&id), Some(2));
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn store_try_update_missing_is_none() {
        let store: Store<TransactionId, u32> = Store::new();
        let result = store.try_update(&TransactionId::new(), |v| Ok::<_, ()>(*v));
        assert!(result.is_none());
    }

    #[test]
    fn store_try_update_error_leaves_value() {
        let store: Store<TransactionId, u32> = Store::new();
        let id = TransactionId::new();
        store.insert(id, 7);
        let result = store.try_update(&id, |v| if *v > 5 { Err("too big") } else { Ok(()) });
        assert_eq!(result, Some(Err("too big")));
        assert_eq!(store.get(&id), Some(7));
    }

    #[test]
    fn store_clone_shares_underlying_data() {
        let a: Store<TransactionId, u32> = Store::new();
        let b = a.clone();
        let id = TransactionId::new();
        a.insert(id, 3);
        assert_eq!(b.get(&id), Some(3));
    }

    // ── PrincipalStore ───────────────────────────────────────────

    #[test]
    fn create_assigns_sequential_identifiers_per_role() {
        let store = PrincipalStore::new();
        let now = Utc::now();
        let a = store
            .create(registration(Role::Student, "a@campus.test"), hash(), now)
            .unwrap();
        let b = store
            .create(registration(Role::Student, "b@campus.test"), hash(), now)
            .unwrap();
        let m = store
            .create(registration(Role::Member, "a@campus.test"), hash(), now)
            .unwrap();
        assert_eq!(a.principal.identifier(), "STU-000001");
        assert_eq!(b.principal.identifier(), "STU-000002");
        assert_eq!(m.principal.identifier(), "MEM-000001");
        assert_eq!(b.sequence, 2);
    }

    #[test]
    fn create_rejects_duplicate_email_within_role() {
        let store = PrincipalStore::new();
        let now = Utc::now();
        store
            .create(registration(Role::Volunteer, "v@campus.test"), hash(), now)
            .unwrap();
        let err = store
            .create(registration(Role::Volunteer, "V@Campus.Test"), hash(), now)
            .unwrap_err();
        assert!(matches!(
            err,
            CredentialError::DuplicateEmail {
                role: Role::Volunteer
            }
        ));
        // The failed attempt does not consume an identifier.
        let next = store
            .create(registration(Role::Volunteer, "w@campus.test"), hash(), now)
            .unwrap();
        assert_eq!(next.principal.identifier(), "VOL-000002");
    }

    #[test]
    fn find_by_email_is_role_scoped() {
        let store = PrincipalStore::new();
        let created = store
            .create(registration(Role::Member, "m@campus.test"), hash(), Utc::now())
            .unwrap();
        let email = Email::new("m@campus.test").unwrap();
        assert_eq!(
            store.find_by_email(Role::Member, &email).unwrap().id,
            created.principal.id
        );
        assert!(store.find_by_email(Role::Student, &email).is_none());
    }

    #[test]
    fn list_role_keeps_registration_order() {
        let store = PrincipalStore::new();
        let now = Utc::now();
        let ids: Vec<PrincipalId> = ["c", "a", "b"]
            .iter()
            .map(|n| {
                store
                    .create(
                        registration(Role::Student, &format!("{n}@campus.test")),
                        hash(),
                        now,
                    )
                    .unwrap()
                    .principal
                    .id
            })
            .collect();
        store
            .create(registration(Role::Member, "x@campus.test"), hash(), now)
            .unwrap();
        let listed: Vec<PrincipalId> = store
            .list_role(Role::Student)
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(listed, ids);
        assert_eq!(store.count_by_role().get(&Role::Student), Some(&3));
    }

    #[test]
    fn restore_counter_only_raises() {
        let store = PrincipalStore::new();
        store.restore_counter(Role::Student, 41);
        store.restore_counter(Role::Student, 3);
        let created = store
            .create(registration(Role::Student, "s@campus.test"), hash(), Utc::now())
            .unwrap();
        assert_eq!(created.principal.identifier(), "STU-000042");
    }

    #[test]
    fn roll_numbers_are_unique_across_students() {
        let store = PrincipalStore::new();
        let now = Utc::now();
        let mut ids = Vec::new();
        for email in ["a@campus.test", "b@campus.test"] {
            let id = store
                .create(registration(Role::Student, email), hash(), now)
                .unwrap()
                .principal
                .id;
            store
                .try_update(&id, |p| {
                    p.apply_approval_effect(
                        &campus_state::ApprovalEffect::MarkFeePaid { amount: 500 },
                        now,
                    )
                })
                .unwrap()
                .unwrap();
            ids.push(id);
        }

        store.assign_roll_number(&ids[0], "R-101", now).unwrap();
        let err = store.assign_roll_number(&ids[1], "R-101", now).unwrap_err();
        assert!(matches!(err, CredentialError::RollNumberTaken(_)));

        // Reassigning the holder's own number is fine, and frees the old one.
        store.assign_roll_number(&ids[0], "R-102", now).unwrap();
        store.assign_roll_number(&ids[1], "R-101", now).unwrap();
    }

    #[test]
    fn roll_number_requires_fee_paid() {
        let store = PrincipalStore::new();
        let id = store
            .create(registration(Role::Student, "s@campus.test"), hash(), Utc::now())
            .unwrap()
            .principal
            .id;
        let err = store
            .assign_roll_number(&id, "R-1", Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            CredentialError::Principal(campus_state::PrincipalError::FeeNotPaid)
        ));
    }

    // ── ArtifactRegistry ─────────────────────────────────────────

    fn artifact(principal_id: PrincipalId, exam: &str) -> Artifact {
        Artifact {
            id: ArtifactId::new(),
            kind: ArtifactKind::AdmitCard,
            principal_id,
            context_key: exam.to_string(),
            params: ArtifactParams::Exam(ExamParams {
                exam_name: exam.to_string(),
                exam_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                exam_time: None,
                exam_center: "Hall A".to_string(),
            }),
            card_number: "R-1".to_string(),
            photo_ref: None,
            generated_at: Utc::now(),
            generated_by: PrincipalId::new(),
        }
    }

    #[test]
    fn registry_rejects_same_key() {
        let registry = ArtifactRegistry::new();
        let holder = PrincipalId::new();
        registry.insert_unique(artifact(holder, "finals")).unwrap();
        let err = registry.insert_unique(artifact(holder, "finals")).unwrap_err();
        assert!(matches!(err, ArtifactError::AlreadyExists { .. }));
        registry.insert_unique(artifact(holder, "midterms")).unwrap();
        assert_eq!(registry.for_principal(holder).len(), 2);
        assert_eq!(
            registry.count_by_kind().get(&ArtifactKind::AdmitCard),
            Some(&2)
        );
    }

    #[test]
    fn registry_remove_frees_key() {
        let registry = ArtifactRegistry::new();
        let a = artifact(PrincipalId::new(), "finals");
        let key = a.key();
        let id = a.id;
        registry.insert_unique(a).unwrap();
        assert!(registry.contains_key(&key));
        registry.remove(&id).unwrap();
        assert!(!registry.contains_key(&key));
    }

    // ── AppState ─────────────────────────────────────────────────

    #[test]
    fn app_state_without_key_is_ephemeral() {
        let config = AppConfig {
            hash_memory_kib: 1024,
            hash_iterations: 1,
            ..AppConfig::default()
        };
        let state = AppState::try_with_config(config, None).unwrap();
        assert!(state.token_key_ephemeral);
        assert!(state.ledger.is_empty());
        assert!(state.db_pool.is_none());
    }

    #[test]
    fn app_state_rejects_bad_token_key() {
        let config = AppConfig {
            token_key_hex: Some(zeroize::Zeroizing::new("not-hex".to_string())),
            ..AppConfig::default()
        };
        let err = AppState::try_with_config(config, None).unwrap_err();
        assert!(matches!(err, StateInitError::TokenKey(_)));
    }

    #[test]
    fn ledger_cas_allows_one_resolution() {
        let state = AppState::try_with_config(
            AppConfig {
                hash_memory_kib: 1024,
                hash_iterations: 1,
                ..AppConfig::default()
            },
            None,
        )
        .unwrap();
        let tx = PaymentTransaction::record(
            campus_state::PaymentClaim {
                payment_type: campus_state::PaymentType::Donation,
                name: "Ravi".to_string(),
                email: None,
                phone: Some("98200 00000".to_string()),
                amount: 100,
                external_id: "UTR1".to_string(),
                purpose: None,
            },
            None,
            Utc::now(),
        )
        .unwrap();
        let id = tx.id;
        state.ledger.insert(id, tx);
        let admin = PrincipalId::new();
        let first = state.ledger.try_update(&id, |t| t.approve(admin, Utc::now()));
        let second = state.ledger.try_update(&id, |t| t.approve(admin, Utc::now()));
        assert!(first.unwrap().is_ok());
        assert!(second.unwrap().is_err());
        assert_eq!(state.ledger.get(&id).unwrap().status, PaymentStatus::Approved);
    }

    fn reset_record(principal_id: PrincipalId, created_at: DateTime<Utc>, ttl: Duration) -> ResetTokenRecord {
        let issued = campus_crypto::reset::issue();
        ResetTokenRecord {
            id: issued.id,
            principal_id,
            digest: issued.digest,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    #[test]
    fn reset_tokens_per_principal_are_capped_oldest_first() {
        let store = ResetTokenStore::new();
        let owner = PrincipalId::new();
        let start = Utc::now();
        let records: Vec<ResetTokenRecord> = (0..MAX_RESET_TOKENS_PER_PRINCIPAL as i64 + 2)
            .map(|n| reset_record(owner, start + Duration::seconds(n), Duration::hours(24)))
            .collect();

        let mut evicted = Vec::new();
        for record in &records {
            evicted.extend(store.issue(record.clone(), start));
        }
        assert_eq!(store.held_by(owner), MAX_RESET_TOKENS_PER_PRINCIPAL);
        assert_eq!(evicted, vec![records[0].id, records[1].id]);
        assert!(store.take(&records[0].id).is_none());
        assert!(store.take(&records.last().unwrap().id).is_some());

        // Other principals are unaffected.
        let other = PrincipalId::new();
        assert!(store.issue(reset_record(other, start, Duration::hours(24)), start).is_empty());
        assert_eq!(store.held_by(other), 1);
    }

    #[test]
    fn expired_reset_tokens_are_swept_once_the_store_is_large() {
        let store = ResetTokenStore::new();
        let issued_at = Utc::now() - Duration::hours(48);
        for _ in 0..RESET_SWEEP_THRESHOLD {
            store.restore(reset_record(PrincipalId::new(), issued_at, Duration::hours(24)));
        }
        let live = reset_record(PrincipalId::new(), Utc::now(), Duration::hours(24));
        let removed = store.issue(live.clone(), Utc::now());
        assert_eq!(removed.len(), RESET_SWEEP_THRESHOLD);
        assert_eq!(store.len(), 1);
        assert!(store.take(&live.id).is_some());
    }

    #[test]
    fn revoke_principal_drops_only_their_tokens() {
        let store = ResetTokenStore::new();
        let owner = PrincipalId::new();
        let other = PrincipalId::new();
        let now = Utc::now();
        store.issue(reset_record(owner, now, Duration::hours(1)), now);
        store.issue(reset_record(owner, now, Duration::hours(1)), now);
        store.issue(reset_record(other, now, Duration::hours(1)), now);

        assert_eq!(store.revoke_principal(owner).len(), 2);
        assert_eq!(store.held_by(owner), 0);
        assert_eq!(store.len(), 1);
    }
}
