//! # Authentication API
//!
//! One set of handlers for every role; the role is the `{role}` path
//! segment. Register, login and password reset are public and rate
//! limited. `me` and `icard` require a bearer token issued for the same
//! role as the path.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use campus_core::error::require_field;
use campus_core::{Role, ValidationError};
use campus_state::{ArtifactKind, Registration};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zeroize::Zeroizing;

use crate::auth::{require_role, require_self, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::routes::parse_role;
use crate::state::AppState;
use crate::views::{ArtifactResponse, MessageResponse, PrincipalResponse};

// -- Request and response types -------------------------------------------------

/// Registration form. `class_name` is required for students only.
#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    #[serde(alias = "secret")]
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub class_name: Option<String>,
}

impl RegisterRequest {
    /// Convert into a registration for `role`.
    pub fn into_registration(self, role: Role) -> Registration {
        Registration {
            role,
            email: self.email,
            secret: self.password,
            name: self.name,
            phone: self.phone,
            address: self.address,
            city: self.city,
            class_name: self.class_name,
        }
    }
}

/// Login form.
#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    #[serde(alias = "secret")]
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_field(Some(&self.email), "email")?;
        if self.password.is_empty() {
            return Err(ValidationError::MissingField { field: "password" });
        }
        Ok(())
    }
}

/// A bearer token and the principal it was issued to.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub principal: PrincipalResponse,
}

/// Password reset request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Password reset confirmation.
#[derive(Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    #[serde(alias = "secret", alias = "new_password")]
    pub password: String,
}

impl Validate for ResetPasswordRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_field(Some(&self.token), "token")?;
        Ok(())
    }
}

// -- Routers ------------------------------------------------------------------------

/// Public routes. Mounted behind the rate limiter.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/:role/register", post(register))
        .route("/api/auth/:role/login", post(login))
        .route("/api/auth/:role/forgot-password", post(forgot_password))
        .route("/api/auth/:role/reset-password", post(reset_password))
}

/// Authenticated routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/:role/me", get(me))
        .route("/api/auth/:role/icard", get(my_identity_card))
}

// -- Handlers -----------------------------------------------------------------------

/// POST /api/auth/:role/register — Self-service registration.
#[utoipa::path(
    post,
    path = "/api/auth/{role}/register",
    params(("role" = String, Path, description = "student, member or volunteer")),
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Principal registered", body = PrincipalResponse),
        (status = 403, description = "Role is not self-service", body = crate::error::ErrorBody),
        (status = 409, description = "Email already registered for this role", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn register(
    State(state): State<AppState>,
    Path(role): Path<String>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PrincipalResponse>), AppError> {
    let role = parse_role(&role)?;
    let req = extract_json(body)?;
    let principal = crate::credentials::register(&state, req.into_registration(role)).await?;
    Ok((StatusCode::CREATED, Json(PrincipalResponse::from(&principal))))
}

/// POST /api/auth/:role/login — Exchange credentials for a bearer token.
#[utoipa::path(
    post,
    path = "/api/auth/{role}/login",
    params(("role" = String, Path, description = "student, member, volunteer or admin")),
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 401, description = "Invalid email or password", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn login(
    State(state): State<AppState>,
    Path(role): Path<String>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let role = parse_role(&role)?;
    let req = extract_validated_json(body)?;
    let principal = crate::credentials::authenticate(
        &state,
        role,
        &req.email,
        Zeroizing::new(req.password),
    )
    .await?;
    let issued = state
        .tokens
        .issue(principal.id, role)
        .map_err(|e| AppError::Internal(format!("token issuance failed: {e}")))?;
    Ok(Json(LoginResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        principal: PrincipalResponse::from(&principal),
    }))
}

/// POST /api/auth/:role/forgot-password — Request a reset token.
///
/// The response is identical whether or not the email is registered.
#[utoipa::path(
    post,
    path = "/api/auth/{role}/forgot-password",
    params(("role" = String, Path, description = "student, member, volunteer or admin")),
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Request accepted", body = MessageResponse),
    ),
    tag = "auth"
)]
async fn forgot_password(
    State(state): State<AppState>,
    Path(role): Path<String>,
    body: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let role = parse_role(&role)?;
    let req = extract_json(body)?;
    let outcome = crate::credentials::reset_secret_request(&state, role, &req.email).await?;
    Ok(Json(MessageResponse {
        message: outcome.message.to_string(),
    }))
}

/// POST /api/auth/:role/reset-password — Set a new password with a reset token.
#[utoipa::path(
    post,
    path = "/api/auth/{role}/reset-password",
    params(("role" = String, Path, description = "student, member, volunteer or admin")),
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 401, description = "Invalid or expired reset token", body = crate::error::ErrorBody),
        (status = 422, description = "New password rejected", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn reset_password(
    State(state): State<AppState>,
    Path(role): Path<String>,
    body: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    parse_role(&role)?;
    let req = extract_validated_json(body)?;
    crate::credentials::reset_secret_confirm(&state, req.token.trim(), Zeroizing::new(req.password))
        .await?;
    Ok(Json(MessageResponse {
        message: "Password has been reset.".to_string(),
    }))
}

/// GET /api/auth/:role/me — The caller's own profile.
#[utoipa::path(
    get,
    path = "/api/auth/{role}/me",
    params(("role" = String, Path, description = "Role the token was issued for")),
    responses(
        (status = 200, description = "Caller profile", body = PrincipalResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorBody),
        (status = 403, description = "Token issued for another role", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
async fn me(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(role): Path<String>,
) -> Result<Json<PrincipalResponse>, AppError> {
    let role = parse_role(&role)?;
    require_role(&caller, &[role])?;
    let principal = state
        .principals
        .get(&caller.principal_id)
        .ok_or_else(|| AppError::NotFound(format!("principal {} not found", caller.principal_id)))?;
    require_self(&caller, principal.id)?;
    Ok(Json(PrincipalResponse::from(&principal)))
}

/// GET /api/auth/:role/icard — The caller's identity card.
#[utoipa::path(
    get,
    path = "/api/auth/{role}/icard",
    params(("role" = String, Path, description = "member or volunteer")),
    responses(
        (status = 200, description = "Identity card", body = ArtifactResponse),
        (status = 403, description = "Role has no identity card", body = crate::error::ErrorBody),
        (status = 404, description = "No identity card generated yet", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
async fn my_identity_card(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(role): Path<String>,
) -> Result<Json<ArtifactResponse>, AppError> {
    let role = parse_role(&role)?;
    require_role(&caller, &[role])?;
    require_role(&caller, &[Role::Member, Role::Volunteer])?;
    let card = crate::artifacts::get_own(&state, &caller, ArtifactKind::IdentityCard)?;
    Ok(Json(ArtifactResponse::from(&card)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::ResetDelivery;
    use crate::routes::test_support::*;
    use axum::http::Method;
    use campus_state::Principal;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[derive(Debug, Default)]
    struct Outbox(Mutex<Vec<String>>);

    impl ResetDelivery for Outbox {
        fn deliver(&self, _principal: &Principal, token: &str, _expires_at: DateTime<Utc>) {
            self.0.lock().push(token.to_string());
        }
    }

    fn register_body(email: &str) -> serde_json::Value {
        serde_json::json!({
            "email": email,
            "password": "s3cret!",
            "name": "Asha Rao",
            "phone": "98200 00000",
            "class_name": "Class 10"
        })
    }

    #[tokio::test]
    async fn register_then_login_returns_same_principal() {
        let state = test_state();
        let app = test_app(&state);

        let resp = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/auth/student/register",
                None,
                Some(register_body("Asha@Campus.test")),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let registered: PrincipalResponse = body_json(resp).await;
        assert_eq!(registered.identifier, "STU-000001");
        assert_eq!(registered.email.as_str(), "asha@campus.test");

        let resp = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/auth/student/login",
                None,
                Some(serde_json::json!({"email": "asha@campus.test", "password": "s3cret!"})),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let login: LoginResponse = body_json(resp).await;
        assert_eq!(login.principal.id, registered.id);

        let resp = app
            .oneshot(request(Method::GET, "/api/auth/student/me", Some(&login.token), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let me: PrincipalResponse = body_json(resp).await;
        assert_eq!(me.id, registered.id);
    }

    #[tokio::test]
    async fn duplicate_email_is_scoped_to_role() {
        let state = test_state();
        let app = test_app(&state);
        let send = |uri: &'static str| {
            app.clone().oneshot(request(
                Method::POST,
                uri,
                None,
                Some(register_body("same@campus.test")),
            ))
        };

        assert_eq!(send("/api/auth/member/register").await.unwrap().status(), StatusCode::CREATED);
        assert_eq!(send("/api/auth/member/register").await.unwrap().status(), StatusCode::CONFLICT);
        assert_eq!(send("/api/auth/volunteer/register").await.unwrap().status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn register_rejects_admin_unknown_role_and_bad_input() {
        let state = test_state();
        let app = test_app(&state);

        let resp = app
            .clone()
            .oneshot(request(Method::POST, "/api/auth/admin/register", None, Some(register_body("a@campus.test"))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app
            .clone()
            .oneshot(request(Method::POST, "/api/auth/parent/register", None, Some(register_body("t@campus.test"))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let mut short = register_body("s@campus.test");
        short["password"] = serde_json::json!("abc");
        let resp = app
            .clone()
            .oneshot(request(Method::POST, "/api/auth/student/register", None, Some(short)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = body_json(resp).await;
        assert_eq!(body["error"]["details"]["field"], "password");

        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method(Method::POST)
                    .uri("/api/auth/student/register")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.principals.list_role(Role::Student).is_empty());
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let state = test_state();
        create(&state, Role::Member, "m@campus.test").await;
        let app = test_app(&state);

        let mut messages = Vec::new();
        for body in [
            serde_json::json!({"email": "m@campus.test", "password": "wrong-one"}),
            serde_json::json!({"email": "nobody@campus.test", "password": "s3cret!"}),
        ] {
            let resp = app
                .clone()
                .oneshot(request(Method::POST, "/api/auth/member/login", None, Some(body)))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
            let body: serde_json::Value = body_json(resp).await;
            messages.push(body["error"]["message"].clone());
        }
        assert_eq!(messages[0], messages[1]);

        // Right email and secret under the wrong role.
        let resp = app
            .oneshot(request(
                Method::POST,
                "/api/auth/volunteer/login",
                None,
                Some(serde_json::json!({"email": "m@campus.test", "password": "s3cret!"})),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_requires_matching_role() {
        let state = test_state();
        let volunteer = create(&state, Role::Volunteer, "v@campus.test").await;
        let token = bearer(&state, &volunteer);
        let app = test_app(&state);

        let resp = app
            .clone()
            .oneshot(request(Method::GET, "/api/auth/member/me", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app
            .oneshot(request(Method::GET, "/api/auth/volunteer/me", None, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn forgot_and_reset_password_flow() {
        let outbox = Arc::new(Outbox::default());
        let state = test_state().with_reset_delivery(outbox.clone());
        create(&state, Role::Student, "s@campus.test").await;
        let app = test_app(&state);

        let mut messages = Vec::new();
        for email in ["s@campus.test", "ghost@campus.test"] {
            let resp = app
                .clone()
                .oneshot(request(
                    Method::POST,
                    "/api/auth/student/forgot-password",
                    None,
                    Some(serde_json::json!({ "email": email })),
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            let body: MessageResponse = body_json(resp).await;
            messages.push(body.message);
        }
        assert_eq!(messages[0], messages[1]);
        let token = outbox.0.lock().pop().unwrap();
        assert!(outbox.0.lock().is_empty());

        let reset = |password: &str| {
            app.clone().oneshot(request(
                Method::POST,
                "/api/auth/student/reset-password",
                None,
                Some(serde_json::json!({ "token": token, "password": password })),
            ))
        };
        assert_eq!(reset("n3w-secret").await.unwrap().status(), StatusCode::OK);
        assert_eq!(reset("an0ther-one").await.unwrap().status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .oneshot(request(
                Method::POST,
                "/api/auth/student/login",
                None,
                Some(serde_json::json!({"email": "s@campus.test", "password": "n3w-secret"})),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn icard_is_for_members_and_volunteers_only() {
        let state = test_state();
        let student = create(&state, Role::Student, "s@campus.test").await;
        let volunteer = create(&state, Role::Volunteer, "v@campus.test").await;
        let app = test_app(&state);

        let resp = app
            .clone()
            .oneshot(request(Method::GET, "/api/auth/student/icard", Some(&bearer(&state, &student)), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app
            .oneshot(request(Method::GET, "/api/auth/volunteer/icard", Some(&bearer(&state, &volunteer)), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
