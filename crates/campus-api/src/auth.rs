//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware with role-based access control.
//!
//! ## Token Format
//!
//! ```text
//! Authorization: Bearer v1.<base64url(claims)>.<base64url(ed25519 signature)>
//! ```
//!
//! Tokens are issued by [`TokenService`] at login and verified statelessly.
//! A token is invalidated only by expiry.
//!
//! ## CallerIdentity
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl
//! and then call [`require_role`] and, for self-service routes,
//! [`require_self`].
//!
//! The payment-claim route is public but links the claim to the caller
//! when a bearer token is presented; it uses [`OptionalCaller`].

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use campus_core::{PrincipalId, Role};
use campus_crypto::{TokenClaims, TokenService};

use crate::error::{AppError, ErrorBody, ErrorDetail};

/// Message for every rejected token, whatever the reason.
const INVALID_TOKEN: &str = "invalid or expired token";

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller, available to all route handlers
/// via Axum's `FromRequestParts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    /// The caller's principal id.
    pub principal_id: PrincipalId,
    /// The role the token was issued for.
    pub role: Role,
}

impl From<TokenClaims> for CallerIdentity {
    fn from(claims: TokenClaims) -> Self {
        Self {
            principal_id: claims.sub,
            role: claims.role,
        }
    }
}

/// Extracts the identity that the auth middleware injected into extensions.
/// Returns 401 if no identity is present.
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .copied()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Caller identity on a public route: `None` without an Authorization
/// header, 401 if one is present but invalid.
#[derive(Debug, Clone, Copy)]
pub struct OptionalCaller(pub Option<CallerIdentity>);

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for OptionalCaller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let config = parts
            .extensions
            .get::<AuthConfig>()
            .cloned()
            .ok_or_else(|| AppError::Internal("auth config missing from request extensions".into()))?;
        resolve_bearer(&config.tokens, &parts.headers)
            .map(OptionalCaller)
            .map_err(|msg| AppError::Unauthorized(msg.to_string()))
    }
}

/// Check that the caller holds one of the allowed roles.
/// Returns 403 Forbidden otherwise.
pub fn require_role(caller: &CallerIdentity, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.contains(&caller.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' may not access this resource",
            caller.role.as_str()
        )))
    }
}

/// Check that the caller is the owner of the resource.
pub fn require_self(caller: &CallerIdentity, owner: PrincipalId) -> Result<(), AppError> {
    if caller.principal_id == owner {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "caller may only access their own resources".to_string(),
        ))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub tokens: TokenService,
}

// ── Token Resolution ────────────────────────────────────────────────────────

/// Resolve the Authorization header to a caller.
///
/// `Ok(None)` when the header is absent; `Err` with the client-facing
/// message when it is present but unusable.
pub fn resolve_bearer(
    tokens: &TokenService,
    headers: &HeaderMap,
) -> Result<Option<CallerIdentity>, &'static str> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let header_value = value
        .to_str()
        .map_err(|_| "authorization header must use Bearer scheme")?;
    let Some(provided) = header_value.strip_prefix("Bearer ") else {
        tracing::warn!("authentication failed: non-Bearer authorization scheme");
        return Err("authorization header must use Bearer scheme");
    };
    match tokens.verify(provided.trim()) {
        Ok(claims) => Ok(Some(claims.into())),
        Err(reason) => {
            tracing::warn!(reason = %reason, "authentication failed: invalid bearer token");
            Err(INVALID_TOKEN)
        }
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the Bearer token and inject [`CallerIdentity`] for downstream
/// handlers.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let Some(config) = request.extensions().get::<AuthConfig>().cloned() else {
        tracing::error!("auth config missing from request extensions");
        return AppError::Internal("auth config missing".into()).into_response();
    };

    match resolve_bearer(&config.tokens, request.headers()) {
        Ok(Some(identity)) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Ok(None) => {
            tracing::warn!("authentication failed: missing authorization header");
            unauthorized_response("missing authorization header")
        }
        Err(msg) => unauthorized_response(msg),
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use chrono::Duration;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn tokens() -> TokenService {
        TokenService::from_seed(&[7u8; 32], Duration::hours(1))
    }

    /// Echoes the caller's role.
    async fn whoami(caller: CallerIdentity) -> String {
        caller.role.to_string()
    }

    async fn maybe(OptionalCaller(caller): OptionalCaller) -> String {
        caller.map_or("anonymous".to_string(), |c| c.role.to_string())
    }

    fn test_app() -> Router {
        let protected = Router::new()
            .route("/test", get(whoami))
            .layer(from_fn(auth_middleware));
        Router::new()
            .merge(protected)
            .route("/public", get(maybe))
            .layer(axum::Extension(AuthConfig { tokens: tokens() }))
    }

    async fn error_message(response: Response) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let err: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(err["error"]["code"], "UNAUTHORIZED");
        err["error"]["message"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn valid_bearer_token_accepted() {
        let issued = tokens().issue(PrincipalId::new(), Role::Volunteer).unwrap();
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", format!("Bearer {}", issued.token))
            .body(Body::empty())
            .unwrap();

        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"volunteer");
    }

    #[tokio::test]
    async fn missing_authorization_header_rejected() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(error_message(response).await.contains("missing"));
    }

    #[tokio::test]
    async fn non_bearer_scheme_rejected() {
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(error_message(response).await.contains("Bearer"));
    }

    #[tokio::test]
    async fn forged_and_foreign_tokens_share_one_message() {
        let foreign = TokenService::from_seed(&[9u8; 32], Duration::hours(1))
            .issue(PrincipalId::new(), Role::Admin)
            .unwrap();
        let mut messages = Vec::new();
        for token in ["garbage", "a.b", foreign.token.as_str()] {
            let request = Request::builder()
                .uri("/test")
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap();
            let response = test_app().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            messages.push(error_message(response).await);
        }
        assert!(messages.iter().all(|m| m == INVALID_TOKEN));
    }

    #[tokio::test]
    async fn expired_token_rejected() {
        let service = tokens();
        let issued = service
            .issue_at(
                PrincipalId::new(),
                Role::Student,
                chrono::Utc::now() - Duration::hours(2),
            )
            .unwrap();
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", format!("Bearer {}", issued.token))
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_message(response).await, INVALID_TOKEN);
    }

    #[tokio::test]
    async fn optional_caller_is_anonymous_without_header() {
        let request = Request::builder().uri("/public").body(Body::empty()).unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"anonymous");
    }

    #[tokio::test]
    async fn optional_caller_resolves_valid_token_and_rejects_bad_one() {
        let issued = tokens().issue(PrincipalId::new(), Role::Member).unwrap();
        let request = Request::builder()
            .uri("/public")
            .header("Authorization", format!("Bearer {}", issued.token))
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"member");

        let request = Request::builder()
            .uri("/public")
            .header("Authorization", "Bearer nope")
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn require_role_and_require_self() {
        let caller = CallerIdentity {
            principal_id: PrincipalId::new(),
            role: Role::Student,
        };
        assert!(require_role(&caller, &[Role::Student, Role::Member]).is_ok());
        assert!(matches!(
            require_role(&caller, &[Role::Admin]),
            Err(AppError::Forbidden(_))
        ));
        assert!(require_self(&caller, caller.principal_id).is_ok());
        assert!(matches!(
            require_self(&caller, PrincipalId::new()),
            Err(AppError::Forbidden(_))
        ));
    }
}
