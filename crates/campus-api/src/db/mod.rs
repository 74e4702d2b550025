//! # Database Persistence Layer
//!
//! Postgres persistence for principals, payment transactions, artifacts
//! and reset tokens via SQLx.
//!
//! ## Architecture
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, every
//! mutation of the in-memory stores is written through and the stores are
//! hydrated on startup. When absent, the API runs in-memory only (suitable
//! for development and testing).
//!
//! The same uniqueness rules the stores enforce under their write locks are
//! repeated as constraints: `UNIQUE (role, email)` on principals, the
//! partial roll-number index, `UNIQUE (principal_id, kind, context_key)` on
//! artifacts, and `WHERE status = 'pending'` on resolution.

pub mod artifacts;
pub mod principals;
pub mod reset_tokens;
pub mod transactions;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            tracing::warn!(
                "DATABASE_URL not set, running in-memory only mode. \
                 State will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// A pool pointed at a closed port, for exercising persistence failures.
#[cfg(test)]
pub(crate) fn unreachable_pool() -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_millis(250))
        .connect_lazy("postgres://campus@127.0.0.1:1/campus")
        .expect("connection string parses")
}
