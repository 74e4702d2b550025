//! Payment transaction persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `payment_transactions`
//! table. Resolution is guarded by `WHERE status = 'pending'`, so a second
//! resolution affects no rows.

use campus_core::{Email, PrincipalId, Role, TransactionId};
use campus_state::{Claimant, PaymentStatus, PaymentTransaction, PaymentType, Principal, PrincipalLink};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a newly recorded transaction.
pub async fn insert(pool: &PgPool, record: &PaymentTransaction) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO payment_transactions (id, payment_type, claimant_name, claimant_email,
         claimant_phone, amount, external_id, purpose, status, principal_id, principal_role,
         created_at, resolved_at, resolved_by, rejection_reason)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(*record.id.as_uuid())
    .bind(record.payment_type.as_str())
    .bind(&record.claimant.name)
    .bind(record.claimant.email.as_ref().map(Email::as_str))
    .bind(&record.claimant.phone)
    .bind(record.amount)
    .bind(&record.external_id)
    .bind(&record.purpose)
    .bind(record.status.as_str())
    .bind(record.link.map(|l| *l.principal_id.as_uuid()))
    .bind(record.link.map(|l| l.role.as_str()))
    .bind(record.created_at)
    .bind(record.resolved_at)
    .bind(record.resolved_by.map(|id| *id.as_uuid()))
    .bind(&record.rejection_reason)
    .execute(pool)
    .await?;

    Ok(())
}

/// Persist a resolution and, for an approval with an effect, the updated
/// principal, in one database transaction.
///
/// Returns `false` without writing anything if the row was no longer
/// pending.
pub async fn resolve(
    pool: &PgPool,
    record: &PaymentTransaction,
    principal: Option<&Principal>,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "UPDATE payment_transactions
         SET status = $1, resolved_at = $2, resolved_by = $3, rejection_reason = $4
         WHERE id = $5 AND status = 'pending'",
    )
    .bind(record.status.as_str())
    .bind(record.resolved_at)
    .bind(record.resolved_by.map(|id| *id.as_uuid()))
    .bind(&record.rejection_reason)
    .bind(*record.id.as_uuid())
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    if let Some(principal) = principal {
        super::principals::update(&mut *tx, principal).await?;
    }

    tx.commit().await?;
    Ok(true)
}

/// Link an unlinked transaction to a principal, together with the principal
/// updated by a replayed approval effect, in one database transaction.
///
/// Returns `false` without writing anything if the row was already linked.
pub async fn attach(
    pool: &PgPool,
    id: TransactionId,
    link: PrincipalLink,
    principal: Option<&Principal>,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "UPDATE payment_transactions SET principal_id = $1, principal_role = $2
         WHERE id = $3 AND principal_id IS NULL",
    )
    .bind(*link.principal_id.as_uuid())
    .bind(link.role.as_str())
    .bind(*id.as_uuid())
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    if let Some(principal) = principal {
        super::principals::update(&mut *tx, principal).await?;
    }

    tx.commit().await?;
    Ok(true)
}

/// Load all transactions from the database into the in-memory ledger on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<PaymentTransaction>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        "SELECT id, payment_type, claimant_name, claimant_email, claimant_phone, amount,
         external_id, purpose, status, principal_id, principal_role, created_at,
         resolved_at, resolved_by, rejection_reason
         FROM payment_transactions ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match row.into_record() {
            Some(record) => records.push(record),
            None => {
                tracing::error!("skipping payment transaction row with invalid enum value during load_all");
            }
        }
    }
    Ok(records)
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    payment_type: String,
    claimant_name: String,
    claimant_email: Option<String>,
    claimant_phone: Option<String>,
    amount: i64,
    external_id: String,
    purpose: Option<String>,
    status: String,
    principal_id: Option<Uuid>,
    principal_role: Option<String>,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<Uuid>,
    rejection_reason: Option<String>,
}

impl TransactionRow {
    fn into_record(self) -> Option<PaymentTransaction> {
        let payment_type = match self.payment_type.parse::<PaymentType>() {
            Ok(t) => t,
            Err(_) => {
                tracing::warn!(transaction_id = %self.id, payment_type = %self.payment_type, "unknown payment type in database");
                return None;
            }
        };
        let status = match self.status.parse::<PaymentStatus>() {
            Ok(s) => s,
            Err(_) => {
                tracing::warn!(transaction_id = %self.id, status = %self.status, "unknown payment status in database");
                return None;
            }
        };
        let link = match (self.principal_id, self.principal_role) {
            (Some(principal_id), Some(role)) => match role.parse::<Role>() {
                Ok(role) => Some(PrincipalLink {
                    principal_id: PrincipalId::from_uuid(principal_id),
                    role,
                }),
                Err(_) => {
                    tracing::warn!(transaction_id = %self.id, role = %role, "unknown link role in database");
                    return None;
                }
            },
            _ => None,
        };

        Some(PaymentTransaction {
            id: TransactionId::from_uuid(self.id),
            payment_type,
            claimant: Claimant {
                name: self.claimant_name,
                email: self.claimant_email.and_then(|e| Email::new(e).ok()),
                phone: self.claimant_phone,
            },
            amount: self.amount,
            external_id: self.external_id,
            purpose: self.purpose,
            status,
            link,
            created_at: self.created_at,
            resolved_at: self.resolved_at,
            resolved_by: self.resolved_by.map(PrincipalId::from_uuid),
            rejection_reason: self.rejection_reason,
        })
    }
}
