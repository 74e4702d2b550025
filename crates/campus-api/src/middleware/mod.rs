//! # Middleware Stack
//!
//! Tower middleware for the API layer:
//! - [`tracing_layer`]: request/response tracing with `TraceLayer`.
//! - [`metrics`]: Prometheus request metrics and domain gauges.
//! - [`rate_limit`]: per-client limits on the public auth routes.

pub mod metrics;
pub mod rate_limit;
pub mod tracing_layer;
