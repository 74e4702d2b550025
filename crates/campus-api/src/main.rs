//! # campus-api — Binary Entry Point
//!
//! Starts the Axum HTTP server for the campus portal API.
//! Binds to `PORT` (default 8080).

use campus_api::config::AppConfig;
use campus_api::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    // Initialize structured tracing.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(?config, "configuration loaded");

    // Initialize database pool (optional, absent means in-memory only).
    let db_pool = campus_api::db::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })?;

    let port = config.port;
    let admin = config.admin.clone();
    let state = AppState::try_with_config(config, db_pool).map_err(|e| {
        tracing::error!("State initialization failed: {e}");
        e
    })?;

    // Hydrate in-memory stores from database (if connected).
    state.hydrate_from_db().await.map_err(|e| {
        tracing::error!("Database hydration failed: {e}");
        e
    })?;

    if let Some(admin) = admin {
        match campus_api::credentials::bootstrap_admin(
            &state,
            &admin.email,
            &admin.secret,
            &admin.name,
        )
        .await
        {
            Ok(Some(created)) => {
                tracing::info!(principal_id = %created.id, "bootstrap admin created")
            }
            Ok(None) => tracing::info!("bootstrap admin already present"),
            Err(e) => {
                tracing::error!("Admin bootstrap failed: {e}");
                return Err(e.into());
            }
        }
    }

    let app = campus_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Campus API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    // Peer addresses key the auth rate limiter.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
