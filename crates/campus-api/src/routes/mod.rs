//! # API Route Modules
//!
//! - `auth`: per-role registration, login, password reset and the
//!   caller's own profile and identity card.
//! - `payments`: payment claim submission and the caller's own claims.
//! - `admin`: transaction review, principal listing and admin mutations.
//! - `artifacts`: admit card, membership card and identity card issuance
//!   and the holder's own cards.

pub mod admin;
pub mod artifacts;
pub mod auth;
pub mod payments;

use campus_core::Role;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::AppError;

/// Pagination query parameters for list endpoints.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// Maximum number of items to return (default: 100, max: 1000).
    pub limit: Option<usize>,
    /// Number of items to skip (default: 0).
    pub offset: Option<usize>,
}

impl PaginationParams {
    const DEFAULT_LIMIT: usize = 100;
    const MAX_LIMIT: usize = 1000;

    fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .min(Self::MAX_LIMIT)
    }

    fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    /// Slice one page out of `items`.
    pub fn page<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = self.effective_offset().min(items.len());
        items
            .into_iter()
            .skip(offset)
            .take(self.effective_limit())
            .collect()
    }
}

/// Parse the `{role}` path segment. Unknown roles are a 404, not a 422:
/// the route does not exist.
pub(crate) fn parse_role(raw: &str) -> Result<Role, AppError> {
    raw.parse::<Role>()
        .map_err(|_| AppError::NotFound(format!("unknown role \"{raw}\"")))
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Router test helpers shared by the route modules.

    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use axum::response::Response;
    use axum::Router;
    use campus_core::Role;
    use campus_state::{ApprovalEffect, Principal, Registration};
    use chrono::Utc;
    use http_body_util::BodyExt;
    use serde::de::DeserializeOwned;

    use crate::config::AppConfig;
    use crate::state::AppState;

    pub fn test_state() -> AppState {
        AppState::try_with_config(
            AppConfig {
                hash_memory_kib: 1024,
                hash_iterations: 1,
                metrics_enabled: false,
                ..AppConfig::default()
            },
            None,
        )
        .unwrap()
    }

    pub fn test_app(state: &AppState) -> Router {
        crate::app(state.clone())
    }

    pub async fn create(state: &AppState, role: Role, email: &str) -> Principal {
        let registration = Registration {
            role,
            email: email.to_string(),
            secret: "s3cret!".to_string(),
            name: "Test Person".to_string(),
            phone: Some("98200 00000".to_string()),
            address: None,
            city: None,
            class_name: (role == Role::Student).then(|| "Class 10".to_string()),
        };
        if role == Role::Admin {
            return crate::credentials::bootstrap_admin(state, email, "s3cret!", "Test Admin")
                .await
                .unwrap()
                .unwrap();
        }
        crate::credentials::register(state, registration).await.unwrap()
    }

    /// A student with the fee paid and `roll` assigned.
    pub async fn enrolled_student(state: &AppState, email: &str, roll: &str) -> Principal {
        let student = create(state, Role::Student, email).await;
        state
            .principals
            .try_update(&student.id, |p| {
                p.apply_approval_effect(&ApprovalEffect::MarkFeePaid { amount: 1500 }, Utc::now())
            })
            .unwrap()
            .unwrap();
        crate::credentials::assign_roll_number(state, student.id, roll)
            .await
            .unwrap()
    }

    pub fn bearer(state: &AppState, principal: &Principal) -> String {
        state
            .tokens
            .issue(principal.id, principal.role())
            .unwrap()
            .token
    }

    pub fn request(
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    pub async fn body_json<T: DeserializeOwned>(resp: Response) -> T {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_caps() {
        let items: Vec<usize> = (0..2000).collect();
        assert_eq!(PaginationParams::default().page(items.clone()).len(), 100);

        let capped = PaginationParams {
            limit: Some(5000),
            offset: None,
        };
        assert_eq!(capped.page(items.clone()).len(), 1000);

        let tail = PaginationParams {
            limit: Some(10),
            offset: Some(1995),
        };
        assert_eq!(tail.page(items.clone()), vec![1995, 1996, 1997, 1998, 1999]);

        let past_end = PaginationParams {
            limit: None,
            offset: Some(10_000),
        };
        assert!(past_end.page(items).is_empty());
    }

    #[test]
    fn unknown_role_segment_is_not_found() {
        assert_eq!(parse_role("volunteer").unwrap(), Role::Volunteer);
        assert!(matches!(parse_role("parent"), Err(AppError::NotFound(_))));
    }
}
