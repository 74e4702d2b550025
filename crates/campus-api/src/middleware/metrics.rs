//! # Prometheus Metrics
//!
//! Two families of metrics share one registry:
//!
//! - **HTTP**: request count, latency and error count, labelled by the
//!   matched route template (`/api/auth/:role/login`), never the raw path.
//!   Requests that match no route share the `unmatched` label.
//! - **Domain**: principals by role, transactions by status, artifacts by
//!   kind, outstanding reset tokens and whether the token key is
//!   ephemeral. These are gauges overwritten from a [`DomainSnapshot`] on
//!   every `/metrics` scrape.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use campus_core::Role;
use campus_state::{ArtifactKind, PaymentStatus};
use prometheus::core::Collector;
use prometheus::{
    Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};

/// Route label for requests no route matched.
const UNMATCHED: &str = "unmatched";

/// Latency buckets in seconds. Login and registration include an Argon2id
/// hash, hence the upper range.
const LATENCY_BUCKETS: [f64; 10] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Store counts to publish on a scrape.
#[derive(Debug, Clone, Default)]
pub struct DomainSnapshot {
    /// Registered principals per role.
    pub principals_by_role: HashMap<Role, usize>,
    /// Ledger entries per status.
    pub transactions_by_status: HashMap<PaymentStatus, usize>,
    /// Issued artifacts per kind.
    pub artifacts_by_kind: HashMap<ArtifactKind, usize>,
    /// Reset tokens held in memory.
    pub reset_tokens_outstanding: usize,
    /// The token signing key was generated at startup.
    pub token_key_ephemeral: bool,
}

/// Shared metrics handle. Clones share one registry.
#[derive(Clone)]
pub struct ApiMetrics {
    inner: Arc<Registered>,
}

struct Registered {
    registry: Registry,
    http: HttpMetrics,
    domain: DomainGauges,
}

struct HttpMetrics {
    requests: IntCounterVec,
    errors: IntCounterVec,
    latency: HistogramVec,
}

struct DomainGauges {
    principals: GaugeVec,
    transactions: GaugeVec,
    artifacts: GaugeVec,
    reset_tokens: Gauge,
    token_key_ephemeral: Gauge,
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics")
            .field("requests", &self.requests())
            .field("errors", &self.errors())
            .finish()
    }
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    IntCounterVec::new(Opts::new(name, help), labels).expect("metric can be created")
}

fn gauge_vec(name: &str, help: &str, label: &str) -> GaugeVec {
    GaugeVec::new(Opts::new(name, help), &[label]).expect("metric can be created")
}

fn total(vec: &IntCounterVec) -> u64 {
    vec.collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}

impl ApiMetrics {
    /// Create and register every metric in a fresh registry.
    pub fn new() -> Self {
        let http = HttpMetrics {
            requests: counter_vec(
                "campus_http_requests_total",
                "HTTP requests by method, route and status",
                &["method", "route", "status"],
            ),
            errors: counter_vec(
                "campus_http_errors_total",
                "HTTP responses with a 4xx or 5xx status",
                &["method", "route", "status"],
            ),
            latency: HistogramVec::new(
                HistogramOpts::new(
                    "campus_http_request_duration_seconds",
                    "HTTP request latency by method and route",
                )
                .buckets(LATENCY_BUCKETS.to_vec()),
                &["method", "route"],
            )
            .expect("metric can be created"),
        };
        let domain = DomainGauges {
            principals: gauge_vec("campus_principals_total", "Registered principals by role", "role"),
            transactions: gauge_vec(
                "campus_payment_transactions_total",
                "Payment transactions by status",
                "status",
            ),
            artifacts: gauge_vec("campus_artifacts_total", "Generated artifacts by kind", "kind"),
            reset_tokens: Gauge::new(
                "campus_reset_tokens_outstanding",
                "Password-reset tokens issued and not yet consumed",
            )
            .expect("metric can be created"),
            token_key_ephemeral: Gauge::new(
                "campus_token_key_ephemeral",
                "1 when bearer tokens are signed with a key generated at startup",
            )
            .expect("metric can be created"),
        };

        let registry = Registry::new();
        let collectors: [Box<dyn Collector>; 8] = [
            Box::new(http.requests.clone()),
            Box::new(http.errors.clone()),
            Box::new(http.latency.clone()),
            Box::new(domain.principals.clone()),
            Box::new(domain.transactions.clone()),
            Box::new(domain.artifacts.clone()),
            Box::new(domain.reset_tokens.clone()),
            Box::new(domain.token_key_ephemeral.clone()),
        ];
        for collector in collectors {
            registry
                .register(collector)
                .expect("metric can be registered");
        }

        Self {
            inner: Arc::new(Registered {
                registry,
                http,
                domain,
            }),
        }
    }

    /// Requests observed across all labels.
    pub fn requests(&self) -> u64 {
        total(&self.inner.http.requests)
    }

    /// 4xx and 5xx responses observed across all labels.
    pub fn errors(&self) -> u64 {
        total(&self.inner.http.errors)
    }

    fn observe_request(&self, method: &str, route: &str, status: u16, elapsed_secs: f64) {
        let http = &self.inner.http;
        let failed = status >= 400;
        let status = status.to_string();
        let labels = [method, route, status.as_str()];
        http.requests.with_label_values(&labels).inc();
        http.latency
            .with_label_values(&[method, route])
            .observe(elapsed_secs);
        if failed {
            http.errors.with_label_values(&labels).inc();
        }
    }

    /// Overwrite the domain gauges. Every role, status and kind is written,
    /// zero when absent from the snapshot, so series never go stale.
    pub fn publish(&self, snapshot: &DomainSnapshot) {
        let domain = &self.inner.domain;
        for role in Role::ALL {
            let count = snapshot.principals_by_role.get(&role).copied().unwrap_or(0);
            domain
                .principals
                .with_label_values(&[role.as_str()])
                .set(count as f64);
        }
        for status in PaymentStatus::ALL {
            let count = snapshot
                .transactions_by_status
                .get(&status)
                .copied()
                .unwrap_or(0);
            domain
                .transactions
                .with_label_values(&[status.as_str()])
                .set(count as f64);
        }
        for kind in ArtifactKind::ALL {
            let count = snapshot.artifacts_by_kind.get(&kind).copied().unwrap_or(0);
            domain
                .artifacts
                .with_label_values(&[kind.as_str()])
                .set(count as f64);
        }
        domain
            .reset_tokens
            .set(snapshot.reset_tokens_outstanding as f64);
        domain
            .token_key_ephemeral
            .set(if snapshot.token_key_ephemeral { 1.0 } else { 0.0 });
    }

    /// Encode the registry in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.inner.registry.gather(), &mut buffer)
            .map_err(|e| format!("failed to encode metrics: {e}"))?;
        String::from_utf8(buffer).map_err(|e| format!("metrics output is not UTF-8: {e}"))
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Record method, matched route, status and latency for every request.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let Some(metrics) = request.extensions().get::<ApiMetrics>().cloned() else {
        return next.run(request).await;
    };
    let method = request.method().as_str().to_owned();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| UNMATCHED.to_owned());
    let started = Instant::now();

    let response = next.run(request).await;

    metrics.observe_request(
        &method,
        &route,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}
