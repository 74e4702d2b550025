//! # Artifact API
//!
//! Admin issuance of admit cards (single and bulk), membership cards and
//! identity cards, and the holder's own admit and membership card.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use campus_core::{PrincipalId, Role};
use campus_state::{ArtifactKind, ArtifactParams, CardParams, ExamParams};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::artifacts::BulkOutcome;
use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::state::AppState;
use crate::views::ArtifactResponse;

/// Exam details shared by the single and bulk admit-card requests.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ExamDetails {
    pub exam_name: String,
    #[schema(value_type = String, format = Date)]
    pub exam_date: NaiveDate,
    pub exam_time: Option<String>,
    pub exam_center: String,
}

impl From<ExamDetails> for ExamParams {
    fn from(d: ExamDetails) -> Self {
        Self {
            exam_name: d.exam_name,
            exam_date: d.exam_date,
            exam_time: d.exam_time,
            exam_center: d.exam_center,
        }
    }
}

/// Generate one admit card.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AdmitCardRequest {
    #[schema(value_type = String, format = Uuid)]
    pub student_id: Uuid,
    #[serde(flatten)]
    pub exam: ExamDetails,
    pub photo_ref: Option<String>,
}

/// Generate admit cards for a class, or `"all"`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkAdmitCardRequest {
    pub class_name: String,
    #[serde(flatten)]
    pub exam: ExamDetails,
}

/// Generate a membership or identity card.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CardRequest {
    #[schema(value_type = String, format = Uuid)]
    pub principal_id: Uuid,
    #[schema(value_type = String, format = Date)]
    pub valid_from: NaiveDate,
    #[schema(value_type = String, format = Date)]
    pub valid_until: NaiveDate,
    pub photo_ref: Option<String>,
}

/// Build the artifacts router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admit-cards", post(generate_admit_card))
        .route("/api/admit-cards/bulk", post(generate_admit_cards_bulk))
        .route("/api/membership-cards", post(generate_membership_card))
        .route("/api/identity-cards", post(generate_identity_card))
        .route("/api/my-admit-card", get(my_admit_card))
        .route("/api/my-membership-card", get(my_membership_card))
}

/// POST /api/admit-cards — Generate an admit card for one student.
#[utoipa::path(
    post,
    path = "/api/admit-cards",
    request_body = AdmitCardRequest,
    responses(
        (status = 201, description = "Admit card generated", body = ArtifactResponse),
        (status = 409, description = "Student already holds a card for this exam", body = crate::error::ErrorBody),
        (status = 422, description = "Student not eligible", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "artifacts"
)]
async fn generate_admit_card(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<AdmitCardRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ArtifactResponse>), AppError> {
    require_role(&caller, &[Role::Admin])?;
    let req = extract_json(body)?;
    let card = crate::artifacts::generate(
        &state,
        PrincipalId::from_uuid(req.student_id),
        ArtifactKind::AdmitCard,
        ArtifactParams::Exam(req.exam.into()),
        req.photo_ref,
        caller.principal_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(ArtifactResponse::from(&card))))
}

/// POST /api/admit-cards/bulk — Generate admit cards for a class.
#[utoipa::path(
    post,
    path = "/api/admit-cards/bulk",
    request_body = BulkAdmitCardRequest,
    responses(
        (status = 200, description = "Run finished; see counts", body = BulkOutcome),
    ),
    security(("bearer_auth" = [])),
    tag = "artifacts"
)]
async fn generate_admit_cards_bulk(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<BulkAdmitCardRequest>, JsonRejection>,
) -> Result<Json<BulkOutcome>, AppError> {
    require_role(&caller, &[Role::Admin])?;
    let req = extract_json(body)?;
    let outcome = crate::artifacts::generate_for_class(
        &state,
        &req.class_name,
        req.exam.into(),
        caller.principal_id,
    )
    .await?;
    Ok(Json(outcome))
}

/// POST /api/membership-cards — Generate a membership card.
#[utoipa::path(
    post,
    path = "/api/membership-cards",
    request_body = CardRequest,
    responses(
        (status = 201, description = "Membership card generated", body = ArtifactResponse),
        (status = 409, description = "Card already exists for this window", body = crate::error::ErrorBody),
        (status = 422, description = "Membership not active", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "artifacts"
)]
async fn generate_membership_card(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CardRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ArtifactResponse>), AppError> {
    generate_card(state, caller, body, ArtifactKind::MembershipCard).await
}

/// POST /api/identity-cards — Generate an identity card.
#[utoipa::path(
    post,
    path = "/api/identity-cards",
    request_body = CardRequest,
    responses(
        (status = 201, description = "Identity card generated", body = ArtifactResponse),
        (status = 409, description = "Card already exists for this window", body = crate::error::ErrorBody),
        (status = 422, description = "Principal not eligible", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "artifacts"
)]
async fn generate_identity_card(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CardRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ArtifactResponse>), AppError> {
    generate_card(state, caller, body, ArtifactKind::IdentityCard).await
}

async fn generate_card(
    state: AppState,
    caller: CallerIdentity,
    body: Result<Json<CardRequest>, JsonRejection>,
    kind: ArtifactKind,
) -> Result<(StatusCode, Json<ArtifactResponse>), AppError> {
    require_role(&caller, &[Role::Admin])?;
    let req = extract_json(body)?;
    let card = crate::artifacts::generate(
        &state,
        PrincipalId::from_uuid(req.principal_id),
        kind,
        ArtifactParams::Card(CardParams {
            valid_from: req.valid_from,
            valid_until: req.valid_until,
        }),
        req.photo_ref,
        caller.principal_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(ArtifactResponse::from(&card))))
}

/// GET /api/my-admit-card — The calling student's latest admit card.
#[utoipa::path(
    get,
    path = "/api/my-admit-card",
    responses(
        (status = 200, description = "Admit card", body = ArtifactResponse),
        (status = 404, description = "No admit card generated yet", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "artifacts"
)]
async fn my_admit_card(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<ArtifactResponse>, AppError> {
    require_role(&caller, &[Role::Student])?;
    let card = crate::artifacts::get_own(&state, &caller, ArtifactKind::AdmitCard)?;
    Ok(Json(ArtifactResponse::from(&card)))
}

/// GET /api/my-membership-card — The calling member's latest membership card.
#[utoipa::path(
    get,
    path = "/api/my-membership-card",
    responses(
        (status = 200, description = "Membership card", body = ArtifactResponse),
        (status = 404, description = "No membership card generated yet", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "artifacts"
)]
async fn my_membership_card(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<ArtifactResponse>, AppError> {
    require_role(&caller, &[Role::Member])?;
    let card = crate::artifacts::get_own(&state, &caller, ArtifactKind::MembershipCard)?;
    Ok(Json(ArtifactResponse::from(&card)))
}
