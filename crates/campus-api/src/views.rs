//! Response bodies shared by the route modules.
//!
//! Domain records are never serialized directly: [`PrincipalResponse`]
//! omits the secret hash, and [`TransactionResponse`] carries the
//! duplicate-reference flag computed at listing time.

use campus_core::{ArtifactId, Email, PrincipalId, Role, TransactionId};
use campus_state::{
    Artifact, ArtifactKind, ArtifactParams, PaymentStatus, PaymentTransaction, PaymentType,
    Principal, RoleProfile,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A principal as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrincipalResponse {
    #[schema(value_type = String, format = Uuid)]
    pub id: PrincipalId,
    #[schema(value_type = String, example = "student")]
    pub role: Role,
    #[schema(value_type = String)]
    pub email: Email,
    /// Sequential identifier, e.g. `STU-000001`.
    pub identifier: String,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    /// Role-specific status, tagged by `role`.
    #[schema(value_type = Object)]
    pub profile: RoleProfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Principal> for PrincipalResponse {
    fn from(p: &Principal) -> Self {
        Self {
            id: p.id,
            role: p.role(),
            email: p.email.clone(),
            identifier: p.identifier().to_string(),
            name: p.details.name.clone(),
            phone: p.details.phone.clone(),
            address: p.details.address.clone(),
            city: p.details.city.clone(),
            profile: p.profile.clone(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// A payment transaction as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    #[schema(value_type = String, format = Uuid)]
    pub id: TransactionId,
    #[schema(value_type = String, example = "fee")]
    pub payment_type: PaymentType,
    pub claimant_name: String,
    #[schema(value_type = Option<String>)]
    pub claimant_email: Option<Email>,
    pub claimant_phone: Option<String>,
    pub amount: i64,
    /// External transaction reference (UTR / bank reference).
    pub transaction_id: String,
    pub purpose: Option<String>,
    #[schema(value_type = String, example = "pending")]
    pub status: PaymentStatus,
    #[schema(value_type = Option<String>, format = Uuid)]
    pub principal_id: Option<PrincipalId>,
    #[schema(value_type = Option<String>)]
    pub principal_role: Option<Role>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = Uuid)]
    pub resolved_by: Option<PrincipalId>,
    pub rejection_reason: Option<String>,
    /// Another transaction carries the same external reference.
    pub duplicate_external_id: bool,
}

impl TransactionResponse {
    /// Render a transaction with its duplicate-reference flag.
    pub fn new(tx: &PaymentTransaction, duplicate_external_id: bool) -> Self {
        Self {
            id: tx.id,
            payment_type: tx.payment_type,
            claimant_name: tx.claimant.name.clone(),
            claimant_email: tx.claimant.email.clone(),
            claimant_phone: tx.claimant.phone.clone(),
            amount: tx.amount,
            transaction_id: tx.external_id.clone(),
            purpose: tx.purpose.clone(),
            status: tx.status,
            principal_id: tx.link.map(|l| l.principal_id),
            principal_role: tx.link.map(|l| l.role),
            created_at: tx.created_at,
            resolved_at: tx.resolved_at,
            resolved_by: tx.resolved_by,
            rejection_reason: tx.rejection_reason.clone(),
            duplicate_external_id,
        }
    }
}

/// A generated artifact as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ArtifactResponse {
    #[schema(value_type = String, format = Uuid)]
    pub id: ArtifactId,
    #[schema(value_type = String, example = "admit_card")]
    pub kind: ArtifactKind,
    #[schema(value_type = String, format = Uuid)]
    pub principal_id: PrincipalId,
    pub context_key: String,
    /// Exam details or validity window, tagged by `type`.
    #[schema(value_type = Object)]
    pub params: ArtifactParams,
    pub card_number: String,
    pub photo_ref: Option<String>,
    pub generated_at: DateTime<Utc>,
    #[schema(value_type = String, format = Uuid)]
    pub generated_by: PrincipalId,
}

impl From<&Artifact> for ArtifactResponse {
    fn from(a: &Artifact) -> Self {
        Self {
            id: a.id,
            kind: a.kind,
            principal_id: a.principal_id,
            context_key: a.context_key.clone(),
            params: a.params.clone(),
            card_number: a.card_number.clone(),
            photo_ref: a.photo_ref.clone(),
            generated_at: a.generated_at,
            generated_by: a.generated_by,
        }
    }
}

/// Plain acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}
