//! Password-reset token persistence. Only verifier digests are stored.

use campus_core::{PrincipalId, ResetTokenId};
use campus_crypto::ResetDigest;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::state::ResetTokenRecord;

/// Insert an issued reset token.
pub async fn insert(pool: &PgPool, record: &ResetTokenRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO reset_tokens (id, principal_id, digest, created_at, expires_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(*record.id.as_uuid())
    .bind(*record.principal_id.as_uuid())
    .bind(record.digest.as_bytes().as_slice())
    .bind(record.created_at)
    .bind(record.expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete a consumed token.
pub async fn delete(pool: &PgPool, id: ResetTokenId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM reset_tokens WHERE id = $1")
        .bind(*id.as_uuid())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete tokens displaced by a newer one or swept after expiry.
pub async fn delete_many(pool: &PgPool, ids: &[ResetTokenId]) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }
    let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
    let result = sqlx::query("DELETE FROM reset_tokens WHERE id = ANY($1)")
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Delete every token held by a principal.
pub async fn delete_for_principal(pool: &PgPool, principal_id: PrincipalId) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM reset_tokens WHERE principal_id = $1")
        .bind(*principal_id.as_uuid())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Load tokens that have not expired at `now`. Expired rows are removed.
pub async fn load_active(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<ResetTokenRecord>, sqlx::Error> {
    let purged = sqlx::query("DELETE FROM reset_tokens WHERE expires_at < $1")
        .bind(now)
        .execute(pool)
        .await?
        .rows_affected();
    if purged > 0 {
        tracing::info!(purged, "removed expired reset tokens");
    }

    let rows = sqlx::query_as::<_, ResetTokenRow>(
        "SELECT id, principal_id, digest, created_at, expires_at FROM reset_tokens",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().filter_map(ResetTokenRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct ResetTokenRow {
    id: Uuid,
    principal_id: Uuid,
    digest: Vec<u8>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl ResetTokenRow {
    fn into_record(self) -> Option<ResetTokenRecord> {
        let Some(digest) = ResetDigest::from_slice(&self.digest) else {
            tracing::warn!(reset_token_id = %self.id, "reset token digest has wrong length, skipping");
            return None;
        };
        Some(ResetTokenRecord {
            id: ResetTokenId::from_uuid(self.id),
            principal_id: PrincipalId::from_uuid(self.principal_id),
            digest,
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }
}
