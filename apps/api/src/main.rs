mod auth;
mod billing;
mod config;
mod db;
mod errors;
mod models;
mod resume;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::clerk::ClerkVerifier;
use crate::billing::store::PgSubscriptionRepository;
use crate::billing::stripe::StripeClient;
use crate::config::Config;
use crate::db::create_pool;
use crate::resume::store::PgResumeRepository;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize Stripe client
    let stripe = StripeClient::new(
        config.stripe_secret_key.clone(),
        config.stripe_price_id.clone(),
        config.app_url.clone(),
    )?;
    info!("Stripe client initialized (price: {})", config.stripe_price_id);

    let state = AppState {
        config: config.clone(),
        resumes: Arc::new(PgResumeRepository::new(db.clone())),
        subscriptions: Arc::new(PgSubscriptionRepository::new(db)),
        payments: Arc::new(stripe),
        verifier: Arc::new(ClerkVerifier::new(&config.clerk_secret_key)),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config)?);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Restricts CORS to the configured web origin; permissive when unset.
fn cors_layer(config: &Config) -> Result<CorsLayer> {
    let Some(origin) = &config.cors_origin else {
        return Ok(CorsLayer::permissive());
    };
    let origin: HeaderValue = origin
        .parse()
        .with_context(|| format!("CORS_ORIGIN '{origin}' is not a valid header value"))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
