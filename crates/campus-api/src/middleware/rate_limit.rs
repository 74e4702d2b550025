//! # Per-Client Rate Limiting
//!
//! Fixed-window limiter for the public auth routes (register, login,
//! password reset), keyed by the client IP address.
//!
//! The client IP is the TCP peer address from [`ConnectInfo`]. The first
//! `X-Forwarded-For` entry replaces it only when
//! [`RateLimitConfig::trust_forwarded_for`] is set, which is correct only
//! behind a reverse proxy that overwrites the header. Requests with neither
//! (in-process callers without a socket) share the `"unknown"` bucket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;

use crate::error::{ErrorBody, ErrorDetail};

/// Buckets kept before stale windows are swept.
const SWEEP_THRESHOLD: usize = 10_000;

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u64,
    /// Window duration in seconds.
    pub window_secs: u64,
    /// Key on `X-Forwarded-For` instead of the peer address.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 300,
            window_secs: 60,
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone)]
struct BucketState {
    count: u64,
    window_start: Instant,
}

/// Shared rate limiter state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<String, BucketState>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }

    /// Count a request from `key`; `false` once the window's budget is spent.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let window = self.window();
        let mut buckets = self.buckets.lock();

        if buckets.len() >= SWEEP_THRESHOLD {
            buckets.retain(|_, b| now.duration_since(b.window_start) < window);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(BucketState {
            count: 0,
            window_start: now,
        });

        if now.duration_since(bucket.window_start) >= window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        if bucket.count >= self.config.max_requests {
            false
        } else {
            bucket.count += 1;
            true
        }
    }
}

/// The client key for a request.
fn client_key(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware that enforces per-client rate limits.
pub async fn rate_limit_middleware(request: Request, next: Next) -> Response {
    let limiter = request.extensions().get::<RateLimiter>().cloned();

    if let Some(limiter) = limiter {
        let key = client_key(&request, limiter.config.trust_forwarded_for);
        if !limiter.check(&key) {
            tracing::warn!(client = %key, path = %request.uri().path(), "rate limit exceeded");
            let body = ErrorBody {
                error: ErrorDetail {
                    code: "RATE_LIMITED".to_string(),
                    message: "rate limit exceeded".to_string(),
                    details: None,
                },
            };
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            if let Ok(value) = HeaderValue::from_str(&limiter.config.window_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            return response;
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn limiter(max_requests: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window_secs: 60,
            trust_forwarded_for: false,
        })
    }

    fn proxied_limiter(max_requests: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window_secs: 60,
            trust_forwarded_for: true,
        })
    }

    #[test]
    fn allows_up_to_max_then_blocks() {
        let l = limiter(3);
        assert!(l.check("a"));
        assert!(l.check("a"));
        assert!(l.check("a"));
        assert!(!l.check("a"));
        assert!(l.check("b"), "other clients have their own bucket");
    }

    #[test]
    fn window_resets_after_elapsed() {
        let l = limiter(1);
        let start = Instant::now();
        assert!(l.check_at("a", start));
        assert!(!l.check_at("a", start + Duration::from_secs(59)));
        assert!(l.check_at("a", start + Duration::from_secs(60)));
    }

    fn app(l: RateLimiter) -> Router {
        Router::new()
            .route("/login", get(|| async { "ok" }))
            .layer(from_fn(rate_limit_middleware))
            .layer(axum::Extension(l))
    }

    fn request(peer: &str, forwarded: Option<&str>) -> Request {
        let peer: SocketAddr = peer.parse().unwrap();
        let mut builder = axum::http::Request::builder()
            .uri("/login")
            .extension(ConnectInfo(peer));
        if let Some(ip) = forwarded {
            builder = builder.header("x-forwarded-for", ip);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn statuses(l: &RateLimiter, requests: Vec<Request>) -> Vec<u16> {
        let mut out = Vec::new();
        for req in requests {
            out.push(app(l.clone()).oneshot(req).await.unwrap().status().as_u16());
        }
        out
    }

    #[tokio::test]
    async fn middleware_returns_429_with_retry_after() {
        let l = limiter(1);
        let first = app(l.clone())
            .oneshot(request("10.0.0.1:50000", None))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app(l.clone())
            .oneshot(request("10.0.0.1:50001", None))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers().get(header::RETRY_AFTER).unwrap(), "60");
    }

    #[tokio::test]
    async fn rotating_forwarded_for_does_not_escape_the_peer_bucket() {
        let l = limiter(2);
        let requests = (1..=5)
            .map(|n| request("203.0.113.9:40000", Some(&format!("198.51.100.{n}"))))
            .collect();
        assert_eq!(statuses(&l, requests).await, vec![200, 200, 429, 429, 429]);
    }

    #[tokio::test]
    async fn peers_without_forwarded_for_are_limited_separately() {
        let l = limiter(2);
        let noisy = (0..3).map(|_| request("203.0.113.9:40000", None)).collect();
        assert_eq!(statuses(&l, noisy).await, vec![200, 200, 429]);

        let quiet = vec![request("192.0.2.44:40000", None)];
        assert_eq!(statuses(&l, quiet).await, vec![200]);
    }

    #[tokio::test]
    async fn trusted_proxy_keys_on_forwarded_client() {
        let l = proxied_limiter(1);
        let requests = vec![
            request("10.0.0.2:8000", Some("198.51.100.1, 10.0.0.2")),
            request("10.0.0.2:8000", Some("198.51.100.2")),
            request("10.0.0.2:8000", Some("198.51.100.1")),
            // Falls back to the peer when the proxy sent no header.
            request("10.0.0.2:8000", None),
            request("10.0.0.2:8000", None),
        ];
        assert_eq!(statuses(&l, requests).await, vec![200, 200, 429, 200, 429]);
    }
}
