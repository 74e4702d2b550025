//! # campus-api — Campus Portal API Service
//!
//! Axum-based HTTP service for role-scoped authentication, payment claim
//! verification and card issuance.
//!
//! ## API Surface
//!
//! | Prefix                                 | Module               | Access          |
//! |----------------------------------------|----------------------|-----------------|
//! | `/api/auth/{role}/register|login`      | [`routes::auth`]     | public, limited |
//! | `/api/auth/{role}/forgot-password`     | [`routes::auth`]     | public, limited |
//! | `/api/auth/{role}/reset-password`      | [`routes::auth`]     | public, limited |
//! | `/api/auth/{role}/me`, `/icard`        | [`routes::auth`]     | bearer          |
//! | `/api/payments`                        | [`routes::payments`] | public          |
//! | `/api/my-payments`                     | [`routes::payments`] | bearer          |
//! | `/api/admin/*`                         | [`routes::admin`]    | admin           |
//! | `/api/admit-cards/*`, `/api/*-cards/*` | [`routes::artifacts`]| bearer          |
//! | `/openapi.json`                        | [`openapi`]          | admin           |
//! | `/health/*`, `/metrics`                | this module          | unauthenticated |
//!
//! ## Middleware Stack
//!
//! ```text
//! Request
//!   → TraceLayer
//!   → Metrics (when enabled)
//!   → Auth (protected routes) / Rate limit (public auth routes)
//!   → Handler
//! ```

pub mod artifacts;
pub mod auth;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod extractors;
pub mod ledger;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod verification;
pub mod views;

use std::collections::HashMap;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use campus_state::PaymentStatus;

use crate::auth::AuthConfig;
use crate::middleware::metrics::{ApiMetrics, DomainSnapshot};
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};
use crate::state::AppState;

/// Build the complete application router.
///
/// Health probes (`/health/*`) and `/metrics` are mounted outside the auth
/// layer so orchestrators and scrapers can reach them without a token.
pub fn app(state: AppState) -> Router {
    let config = &state.config;
    let metrics_on = config.metrics_enabled;
    let metrics = ApiMetrics::new();

    let auth_config = AuthConfig {
        tokens: state.tokens.clone(),
    };
    let limiter = RateLimiter::new(RateLimitConfig {
        max_requests: config.rate_limit_max,
        window_secs: config.rate_limit_window_secs,
        trust_forwarded_for: config.trust_forwarded_for,
    });

    // Registration, login and reset are rate limited per client.
    let public = routes::auth::public_router()
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .merge(routes::payments::public_router());

    let protected = Router::new()
        .merge(routes::auth::router())
        .merge(routes::payments::router())
        .merge(routes::admin::router())
        .merge(routes::artifacts::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware));

    let mut api = public.merge(protected);

    if metrics_on {
        api = api
            .layer(from_fn(middleware::metrics::metrics_middleware))
            .layer(Extension(metrics.clone()));
    }

    let api = api
        .layer(middleware::tracing_layer::layer())
        .layer(Extension(auth_config))
        .layer(Extension(limiter));

    let mut health = Router::new()
        .route("/health/liveness", get(|| async { "ok" }))
        .route("/health/readiness", get(readiness));

    if metrics_on {
        health = health
            .route("/metrics", get(prometheus_metrics))
            .layer(Extension(metrics));
    }

    api.merge(health).with_state(state)
}

/// GET /metrics — Prometheus scrape endpoint.
///
/// Refreshes the domain gauges from the current stores, then encodes the
/// registry in text exposition format.
async fn prometheus_metrics(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> impl IntoResponse {
    let mut transactions_by_status: HashMap<PaymentStatus, usize> = HashMap::new();
    for tx in state.ledger.list() {
        *transactions_by_status.entry(tx.status).or_default() += 1;
    }
    metrics.publish(&DomainSnapshot {
        principals_by_role: state.principals.count_by_role(),
        transactions_by_status,
        artifacts_by_kind: state.artifacts.count_by_kind(),
        reset_tokens_outstanding: state.reset_tokens.len(),
        token_key_ephemeral: state.token_key_ephemeral,
    });

    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode Prometheus metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

/// GET /health/readiness — 503 when the configured database is unreachable.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("Database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }

    (StatusCode::OK, "ready").into_response()
}
