//! # Payment Claims API
//!
//! `POST /api/payments` is public: anyone may report a payment made
//! outside the system. A valid bearer token links the claim to the caller;
//! an invalid one is rejected rather than ignored.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use campus_state::{PaymentClaim, PaymentType};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::{CallerIdentity, OptionalCaller};
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::routes::PaginationParams;
use crate::state::AppState;
use crate::views::TransactionResponse;

/// A reported payment.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentClaimRequest {
    #[schema(value_type = String, example = "fee")]
    pub payment_type: PaymentType,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub amount: i64,
    /// External transaction reference (UTR / bank reference).
    pub transaction_id: String,
    pub purpose: Option<String>,
}

impl From<PaymentClaimRequest> for PaymentClaim {
    fn from(req: PaymentClaimRequest) -> Self {
        Self {
            payment_type: req.payment_type,
            name: req.name,
            email: req.email,
            phone: req.phone,
            amount: req.amount,
            external_id: req.transaction_id,
            purpose: req.purpose,
        }
    }
}

/// Public routes.
pub fn public_router() -> Router<AppState> {
    Router::new().route("/api/payments", post(submit_payment))
}

/// Authenticated routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/my-payments", get(my_payments))
}

/// POST /api/payments — Record a payment claim for admin verification.
#[utoipa::path(
    post,
    path = "/api/payments",
    request_body = PaymentClaimRequest,
    responses(
        (status = 201, description = "Claim recorded as pending", body = TransactionResponse),
        (status = 401, description = "Bearer token present but invalid", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
async fn submit_payment(
    State(state): State<AppState>,
    OptionalCaller(caller): OptionalCaller,
    body: Result<Json<PaymentClaimRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TransactionResponse>), AppError> {
    let req = extract_json(body)?;
    let tx = crate::ledger::record(&state, req.into(), caller).await?;
    let duplicate = crate::ledger::has_duplicate_reference(&state, &tx);
    Ok((
        StatusCode::CREATED,
        Json(TransactionResponse::new(&tx, duplicate)),
    ))
}

/// GET /api/my-payments — Claims linked to the caller, newest first.
#[utoipa::path(
    get,
    path = "/api/my-payments",
    params(PaginationParams),
    responses(
        (status = 200, description = "Caller's payment claims", body = Vec<TransactionResponse>),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "payments"
)]
async fn my_payments(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(pagination): Query<PaginationParams>,
) -> Json<Vec<TransactionResponse>> {
    let entries = crate::ledger::list_own(&state, &caller);
    Json(
        pagination
            .page(entries)
            .iter()
            .map(|e| TransactionResponse::new(&e.transaction, e.duplicate_external_id))
            .collect(),
    )
}
