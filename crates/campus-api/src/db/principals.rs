//! Principal persistence operations.
//!
//! All functions operate on the `principals` and `identifier_counters`
//! tables. The role-specific profile is stored as JSONB.

use campus_core::{Email, PrincipalId, Role};
use campus_crypto::SecretHash;
use campus_state::{Principal, PrincipalDetails, RoleProfile};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Insert a new principal and raise its role's identifier counter, in one
/// database transaction.
pub async fn insert(pool: &PgPool, principal: &Principal, sequence: u64) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO principals (id, role, email, secret_hash, name, phone, address, city,
         profile, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(*principal.id.as_uuid())
    .bind(principal.role().as_str())
    .bind(principal.email.as_str())
    .bind(principal.secret_hash.as_str())
    .bind(&principal.details.name)
    .bind(&principal.details.phone)
    .bind(&principal.details.address)
    .bind(&principal.details.city)
    .bind(Json(&principal.profile))
    .bind(principal.created_at)
    .bind(principal.updated_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO identifier_counters (role, value) VALUES ($1, $2)
         ON CONFLICT (role) DO UPDATE
         SET value = GREATEST(identifier_counters.value, EXCLUDED.value)",
    )
    .bind(principal.role().as_str())
    .bind(i64::try_from(sequence).unwrap_or(i64::MAX))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Overwrite a principal's mutable columns.
///
/// Accepts a pool or an open transaction, so payment approval can update
/// the principal in the same transaction as the ledger row.
pub async fn update<'e>(
    executor: impl PgExecutor<'e>,
    principal: &Principal,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE principals SET secret_hash = $1, name = $2, phone = $3, address = $4,
         city = $5, profile = $6, updated_at = $7 WHERE id = $8",
    )
    .bind(principal.secret_hash.as_str())
    .bind(&principal.details.name)
    .bind(&principal.details.phone)
    .bind(&principal.details.address)
    .bind(&principal.details.city)
    .bind(Json(&principal.profile))
    .bind(principal.updated_at)
    .bind(*principal.id.as_uuid())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load all principals in registration order.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Principal>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PrincipalRow>(
        "SELECT id, role, email, secret_hash, name, phone, address, city, profile,
         created_at, updated_at
         FROM principals ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match row.into_record() {
            Some(record) => records.push(record),
            None => {
                tracing::error!("skipping principal row with invalid role, email or profile during load_all");
            }
        }
    }
    Ok(records)
}

/// Load the identifier counter of every role that has one.
pub async fn load_counters(pool: &PgPool) -> Result<Vec<(Role, u64)>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, i64)>("SELECT role, value FROM identifier_counters")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(role, value)| match role.parse::<Role>() {
            Ok(role) => Some((role, u64::try_from(value).unwrap_or(0))),
            Err(_) => {
                tracing::warn!(role = %role, "unknown role in identifier_counters, skipping");
                None
            }
        })
        .collect())
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct PrincipalRow {
    id: Uuid,
    role: String,
    email: String,
    secret_hash: String,
    name: String,
    phone: Option<String>,
    address: Option<String>,
    city: Option<String>,
    profile: Json<RoleProfile>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PrincipalRow {
    fn into_record(self) -> Option<Principal> {
        let role = match self.role.parse::<Role>() {
            Ok(role) => role,
            Err(_) => {
                tracing::warn!(principal_id = %self.id, role = %self.role, "unknown role in database");
                return None;
            }
        };
        let email = match Email::new(self.email) {
            Ok(email) => email,
            Err(e) => {
                tracing::warn!(principal_id = %self.id, error = %e, "invalid email in database");
                return None;
            }
        };
        let profile = self.profile.0;
        if profile.role() != role {
            tracing::warn!(
                principal_id = %self.id,
                role = %role,
                profile_role = %profile.role(),
                "principal role column disagrees with profile"
            );
            return None;
        }

        Some(Principal {
            id: PrincipalId::from_uuid(self.id),
            email,
            secret_hash: SecretHash::from_phc(self.secret_hash),
            details: PrincipalDetails {
                name: self.name,
                phone: self.phone,
                address: self.address,
                city: self.city,
            },
            profile,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
