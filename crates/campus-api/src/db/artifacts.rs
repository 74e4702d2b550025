//! Artifact persistence operations.

use campus_core::{ArtifactId, PrincipalId};
use campus_state::{Artifact, ArtifactKind, ArtifactParams};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a generated artifact. Fails on the `(principal_id, kind,
/// context_key)` unique constraint if a duplicate slipped past the registry.
pub async fn insert(pool: &PgPool, record: &Artifact) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO artifacts (id, kind, principal_id, context_key, params, card_number,
         photo_ref, generated_at, generated_by)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(*record.id.as_uuid())
    .bind(record.kind.as_str())
    .bind(*record.principal_id.as_uuid())
    .bind(&record.context_key)
    .bind(Json(&record.params))
    .bind(&record.card_number)
    .bind(&record.photo_ref)
    .bind(record.generated_at)
    .bind(*record.generated_by.as_uuid())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load all artifacts on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Artifact>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ArtifactRow>(
        "SELECT id, kind, principal_id, context_key, params, card_number, photo_ref,
         generated_at, generated_by
         FROM artifacts ORDER BY generated_at",
    )
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match row.into_record() {
            Some(record) => records.push(record),
            None => tracing::error!("skipping artifact row with invalid kind during load_all"),
        }
    }
    Ok(records)
}

#[derive(sqlx::FromRow)]
struct ArtifactRow {
    id: Uuid,
    kind: String,
    principal_id: Uuid,
    context_key: String,
    params: Json<ArtifactParams>,
    card_number: String,
    photo_ref: Option<String>,
    generated_at: DateTime<Utc>,
    generated_by: Uuid,
}

impl ArtifactRow {
    fn into_record(self) -> Option<Artifact> {
        let kind = match self.kind.parse::<ArtifactKind>() {
            Ok(kind) => kind,
            Err(_) => {
                tracing::warn!(artifact_id = %self.id, kind = %self.kind, "unknown artifact kind in database");
                return None;
            }
        };
        Some(Artifact {
            id: ArtifactId::from_uuid(self.id),
            kind,
            principal_id: PrincipalId::from_uuid(self.principal_id),
            context_key: self.context_key,
            params: self.params.0,
            card_number: self.card_number,
            photo_ref: self.photo_ref,
            generated_at: self.generated_at,
            generated_by: PrincipalId::from_uuid(self.generated_by),
        })
    }
}
