//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec,
//! served at `/openapi.json` to authenticated admins.

use axum::routing::get;
use axum::{Json, Router};
use campus_core::Role;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::state::AppState;

/// Adds the bearer token security scheme to the OpenAPI spec.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "Signed bearer token returned by POST /api/auth/{role}/login.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Campus Portal API",
        version = "0.3.0",
        description = "Role-scoped authentication, payment verification and card issuance for the campus portal.\n\nAuthentication: Bearer token via `Authorization: Bearer <token>` header, issued per role at login. Registration, login, password reset and payment claims are public. Health probes (`/health/*`) and `/metrics` are unauthenticated.",
        license(name = "BUSL-1.1")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    paths(
        // ── Auth ─────────────────────────────────────────────────────────
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::forgot_password,
        crate::routes::auth::reset_password,
        crate::routes::auth::me,
        crate::routes::auth::my_identity_card,
        // ── Payments ─────────────────────────────────────────────────────
        crate::routes::payments::submit_payment,
        crate::routes::payments::my_payments,
        // ── Admin ────────────────────────────────────────────────────────
        crate::routes::admin::list_transactions,
        crate::routes::admin::resolve_transaction,
        crate::routes::admin::attach_transaction,
        crate::routes::admin::list_principals,
        crate::routes::admin::create_student,
        crate::routes::admin::approve_volunteer,
        crate::routes::admin::assign_fee_level,
        crate::routes::admin::assign_roll_number,
        // ── Artifacts ────────────────────────────────────────────────────
        crate::routes::artifacts::generate_admit_card,
        crate::routes::artifacts::generate_admit_cards_bulk,
        crate::routes::artifacts::generate_membership_card,
        crate::routes::artifacts::generate_identity_card,
        crate::routes::artifacts::my_admit_card,
        crate::routes::artifacts::my_membership_card,
    ),
    components(
        schemas(
            // ── Error types ─────────────────────────────────────────────
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
            // ── Responses ───────────────────────────────────────────────
            crate::views::PrincipalResponse,
            crate::views::TransactionResponse,
            crate::views::ArtifactResponse,
            crate::views::MessageResponse,
            crate::artifacts::BulkOutcome,
            crate::artifacts::BulkFailure,
            crate::routes::auth::LoginResponse,
            // ── Requests ────────────────────────────────────────────────
            crate::routes::auth::RegisterRequest,
            crate::routes::auth::LoginRequest,
            crate::routes::auth::ForgotPasswordRequest,
            crate::routes::auth::ResetPasswordRequest,
            crate::routes::payments::PaymentClaimRequest,
            crate::routes::admin::ResolutionAction,
            crate::routes::admin::ResolveRequest,
            crate::routes::admin::AttachRequest,
            crate::routes::admin::FeeLevelRequest,
            crate::routes::admin::RollNumberRequest,
            crate::routes::artifacts::ExamDetails,
            crate::routes::artifacts::AdmitCardRequest,
            crate::routes::artifacts::BulkAdmitCardRequest,
            crate::routes::artifacts::CardRequest,
        ),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Per-role registration, login, password reset and own profile"),
        (name = "payments", description = "Payment claims reported by payers"),
        (name = "admin", description = "Transaction verification and principal administration"),
        (name = "artifacts", description = "Admit card, membership card and identity card issuance"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router. Mounted behind the auth middleware.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json — Return the generated OpenAPI specification.
async fn openapi_json(caller: CallerIdentity) -> Result<Json<utoipa::openapi::OpenApi>, AppError> {
    require_role(&caller, &[Role::Admin])?;
    Ok(Json(ApiDoc::openapi()))
}
