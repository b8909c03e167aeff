use axum::http::{header, Method};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inflo_api::config::Config;
use inflo_api::store::{SessionPubSub, SessionStore};
use inflo_api::{app_router, AppState};

/// Build the CORS layer based on configuration.
///
/// Configured origins are used as-is. Without `CORS_ORIGINS`, production
/// rejects cross-origin requests and development allows everything.
fn build_cors_layer(config: &Config) -> CorsLayer {
    match &config.cors_allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed_origins: Vec<_> = origins
                .iter()
                .filter_map(|origin| {
                    origin.parse().ok().or_else(|| {
                        tracing::warn!("Invalid CORS origin '{}', skipping", origin);
                        None
                    })
                })
                .collect();

            tracing::info!(
                "CORS configured with {} allowed origin(s): {:?}",
                allowed_origins.len(),
                origins
            );
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
                .max_age(std::time::Duration::from_secs(3600))
        }
        _ if config.is_production() => {
            tracing::warn!(
                "CORS_ORIGINS not configured in production mode. \
                 CORS requests will be rejected."
            );
            CorsLayer::new()
        }
        _ => {
            tracing::warn!("Using permissive CORS in development mode.");
            CorsLayer::permissive()
        }
    }
}

/// Connect Redis-backed store and pub/sub, falling back to memory outside production
async fn connect_backends(config: &Config) -> anyhow::Result<(SessionStore, SessionPubSub)> {
    match SessionStore::connect_redis(config.redis()).await {
        Ok((client, conn)) => {
            tracing::info!("Redis connected for session store and pub/sub");
            Ok((
                SessionStore::new_with_redis(conn),
                SessionPubSub::new_with_redis(client),
            ))
        }
        Err(e) if config.is_production() => {
            Err(anyhow::anyhow!("Redis is required in production: {}", e))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, using in-memory store (single instance mode only)");
            Ok((SessionStore::new_in_memory(), SessionPubSub::new_in_memory()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inflo_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    tracing::info!(
        environment = %config.environment(),
        session_ttl_secs = config.session_ttl_secs,
        secret_ttl_secs = config.secret_ttl_secs,
        seek_tolerance_secs = config.seek_tolerance_secs,
        "Starting Inflo API server on port {}",
        config.port
    );

    let (store, pubsub) = connect_backends(&config).await?;
    let state = AppState::new(store, pubsub, &config);

    let app = app_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
