//! # Admin API
//!
//! Transaction review and principal administration. Every handler requires
//! an admin token.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use campus_core::error::require_field;
use campus_core::{PrincipalId, Role, TransactionId, ValidationError};
use campus_state::{PaymentStatus, PaymentType, TransactionFilter};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::routes::auth::RegisterRequest;
use crate::routes::{parse_role, PaginationParams};
use crate::state::AppState;
use crate::views::{PrincipalResponse, TransactionResponse};

// -- Request types --------------------------------------------------------------

/// Filters for the transaction listing. All optional.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionQuery {
    /// `pending`, `approved` or `rejected`.
    pub status: Option<String>,
    /// `fee`, `donation`, `membership` or `general`.
    pub payment_type: Option<String>,
    /// Only transactions linked to this principal.
    pub principal_id: Option<Uuid>,
    /// Only transactions with no linked principal.
    #[serde(default)]
    pub unlinked: bool,
    /// Case-insensitive substring of the claimant's name or email.
    pub claimant: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl TransactionQuery {
    fn into_parts(self) -> Result<(TransactionFilter, PaginationParams), ValidationError> {
        let filter = TransactionFilter {
            status: self
                .status
                .as_deref()
                .map(str::parse::<PaymentStatus>)
                .transpose()?,
            payment_type: self
                .payment_type
                .as_deref()
                .map(str::parse::<PaymentType>)
                .transpose()?,
            principal_id: self.principal_id.map(PrincipalId::from_uuid),
            unlinked: self.unlinked,
            claimant: self
                .claimant
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
        };
        let pagination = PaginationParams {
            limit: self.limit,
            offset: self.offset,
        };
        Ok((filter, pagination))
    }
}

/// Resolution decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    Approve,
    Reject,
}

/// Approve or reject a pending transaction.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveRequest {
    pub action: ResolutionAction,
    /// Shown to the claimant on rejection.
    pub reason: Option<String>,
}

/// Link an unlinked transaction to a principal.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AttachRequest {
    #[schema(value_type = String, format = Uuid)]
    pub principal_id: Uuid,
}

/// Fee tier for a student.
#[derive(Debug, Deserialize, ToSchema)]
pub struct FeeLevelRequest {
    pub fee_level: String,
    pub fee_amount: i64,
}

impl Validate for FeeLevelRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_field(Some(&self.fee_level), "fee_level")?;
        if self.fee_amount <= 0 {
            return Err(ValidationError::NonPositiveAmount {
                field: "fee_amount",
            });
        }
        Ok(())
    }
}

/// Exam roll number for a student.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RollNumberRequest {
    pub roll_number: String,
}

impl Validate for RollNumberRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_field(Some(&self.roll_number), "roll_number")?;
        Ok(())
    }
}

// -- Router ---------------------------------------------------------------------

/// Build the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/payment-transactions", get(list_transactions))
        .route("/api/admin/payment-transactions/:id", patch(resolve_transaction))
        .route("/api/admin/payment-transactions/:id/attach", post(attach_transaction))
        .route("/api/admin/principals/:role", get(list_principals))
        .route("/api/admin/students", post(create_student))
        .route("/api/admin/volunteers/:id/approve", post(approve_volunteer))
        .route("/api/admin/students/:id/fee-level", post(assign_fee_level))
        .route("/api/admin/students/:id/roll-number", post(assign_roll_number))
}

fn require_admin(caller: &CallerIdentity) -> Result<(), AppError> {
    require_role(caller, &[Role::Admin])
}

// -- Transactions -----------------------------------------------------------------

/// GET /api/admin/payment-transactions — Filtered listing, newest first.
#[utoipa::path(
    get,
    path = "/api/admin/payment-transactions",
    params(TransactionQuery),
    responses(
        (status = 200, description = "Matching transactions", body = Vec<TransactionResponse>),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
        (status = 422, description = "Unknown status or payment type", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
async fn list_transactions(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<TransactionResponse>>, AppError> {
    require_admin(&caller)?;
    let (filter, pagination) = query.into_parts()?;
    let entries = crate::ledger::list_for(&state, &filter);
    Ok(Json(
        pagination
            .page(entries)
            .iter()
            .map(|e| TransactionResponse::new(&e.transaction, e.duplicate_external_id))
            .collect(),
    ))
}

/// PATCH /api/admin/payment-transactions/:id — Approve or reject.
#[utoipa::path(
    patch,
    path = "/api/admin/payment-transactions/{id}",
    params(("id" = Uuid, Path, description = "Transaction ID")),
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Transaction resolved", body = TransactionResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already resolved", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
async fn resolve_transaction(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<TransactionResponse>, AppError> {
    require_admin(&caller)?;
    let req = extract_json(body)?;
    let id = TransactionId::from_uuid(id);
    let tx = match req.action {
        ResolutionAction::Approve => {
            crate::verification::approve(&state, id, caller.principal_id).await?
        }
        ResolutionAction::Reject => {
            crate::verification::reject(&state, id, caller.principal_id, req.reason).await?
        }
    };
    let duplicate = crate::ledger::has_duplicate_reference(&state, &tx);
    Ok(Json(TransactionResponse::new(&tx, duplicate)))
}

/// POST /api/admin/payment-transactions/:id/attach — Link to a principal.
#[utoipa::path(
    post,
    path = "/api/admin/payment-transactions/{id}/attach",
    params(("id" = Uuid, Path, description = "Transaction ID")),
    request_body = AttachRequest,
    responses(
        (status = 200, description = "Transaction linked", body = TransactionResponse),
        (status = 404, description = "Transaction or principal not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already linked", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
async fn attach_transaction(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<AttachRequest>, JsonRejection>,
) -> Result<Json<TransactionResponse>, AppError> {
    require_admin(&caller)?;
    let req = extract_json(body)?;
    let tx = crate::ledger::attach(
        &state,
        TransactionId::from_uuid(id),
        PrincipalId::from_uuid(req.principal_id),
        caller.principal_id,
    )
    .await?;
    let duplicate = crate::ledger::has_duplicate_reference(&state, &tx);
    Ok(Json(TransactionResponse::new(&tx, duplicate)))
}

// -- Principals -------------------------------------------------------------------

/// GET /api/admin/principals/:role — Principals of a role, in registration order.
#[utoipa::path(
    get,
    path = "/api/admin/principals/{role}",
    params(
        ("role" = String, Path, description = "student, member, volunteer or admin"),
        PaginationParams,
    ),
    responses(
        (status = 200, description = "Principals", body = Vec<PrincipalResponse>),
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
async fn list_principals(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(role): Path<String>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Vec<PrincipalResponse>>, AppError> {
    require_admin(&caller)?;
    let role = parse_role(&role)?;
    let principals = crate::credentials::list_principals(&state, role);
    Ok(Json(
        pagination
            .page(principals)
            .iter()
            .map(PrincipalResponse::from)
            .collect(),
    ))
}

/// POST /api/admin/students — Create a student account.
#[utoipa::path(
    post,
    path = "/api/admin/students",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Student created", body = PrincipalResponse),
        (status = 409, description = "Email already registered", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
async fn create_student(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PrincipalResponse>), AppError> {
    require_admin(&caller)?;
    let req = extract_json(body)?;
    let student = crate::credentials::admin_create_student(
        &state,
        req.into_registration(Role::Student),
        caller.principal_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(PrincipalResponse::from(&student))))
}

/// POST /api/admin/volunteers/:id/approve — Approve a volunteer.
#[utoipa::path(
    post,
    path = "/api/admin/volunteers/{id}/approve",
    params(("id" = Uuid, Path, description = "Volunteer principal ID")),
    responses(
        (status = 200, description = "Volunteer approved", body = PrincipalResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already approved", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
async fn approve_volunteer(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<PrincipalResponse>, AppError> {
    require_admin(&caller)?;
    let volunteer = crate::credentials::approve_volunteer(
        &state,
        PrincipalId::from_uuid(id),
        caller.principal_id,
    )
    .await?;
    Ok(Json(PrincipalResponse::from(&volunteer)))
}

/// POST /api/admin/students/:id/fee-level — Assign a fee tier.
#[utoipa::path(
    post,
    path = "/api/admin/students/{id}/fee-level",
    params(("id" = Uuid, Path, description = "Student principal ID")),
    request_body = FeeLevelRequest,
    responses(
        (status = 200, description = "Fee level assigned", body = PrincipalResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
async fn assign_fee_level(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<FeeLevelRequest>, JsonRejection>,
) -> Result<Json<PrincipalResponse>, AppError> {
    require_admin(&caller)?;
    let req = extract_validated_json(body)?;
    let student = crate::credentials::assign_fee_level(
        &state,
        PrincipalId::from_uuid(id),
        &req.fee_level,
        req.fee_amount,
    )
    .await?;
    Ok(Json(PrincipalResponse::from(&student)))
}

/// POST /api/admin/students/:id/roll-number — Assign an exam roll number.
#[utoipa::path(
    post,
    path = "/api/admin/students/{id}/roll-number",
    params(("id" = Uuid, Path, description = "Student principal ID")),
    request_body = RollNumberRequest,
    responses(
        (status = 200, description = "Roll number assigned", body = PrincipalResponse),
        (status = 409, description = "Roll number held by another student", body = crate::error::ErrorBody),
        (status = 422, description = "Fee not paid", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
async fn assign_roll_number(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RollNumberRequest>, JsonRejection>,
) -> Result<Json<PrincipalResponse>, AppError> {
    require_admin(&caller)?;
    let req = extract_validated_json(body)?;
    let student =
        crate::credentials::assign_roll_number(&state, PrincipalId::from_uuid(id), &req.roll_number)
            .await?;
    Ok(Json(PrincipalResponse::from(&student)))
}
