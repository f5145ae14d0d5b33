//! Gocker API Server
//!
//! REST API server for users and tokens.

use anyhow::Context;
use dotenv::dotenv;
use gocker_api::auth::PasswordConfig;
use gocker_api::{create_router, state::AppState};
use gocker_core::config::{AppConfig, LoggingConfig};
use gocker_core::{InMemoryStore, PgStore};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("gocker_api={level},gocker_core={level},tower_http=debug", level = logging.level).into()
    });

    if logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv();

    // Missing secrets are fatal before anything else starts
    let config = AppConfig::load().context("invalid configuration")?;
    init_tracing(&config.logging);
    tracing::debug!(auth = ?config.auth, "configuration loaded");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let hashing = PasswordConfig::default();

    let state = match config.database.url.clone() {
        Some(url) => {
            let store = PgStore::connect(&url, config.database.max_connections).await?;
            store.migrate().await?;
            tracing::info!("using PostgreSQL storage");
            let store = Arc::new(store);
            AppState::new(config, store.clone(), store, &hashing)?
        }
        None => {
            tracing::warn!("DATABASE_URL not set, users and tokens are kept in memory only");
            let store = Arc::new(InMemoryStore::new());
            AppState::new(config, store.clone(), store, &hashing)?
        }
    };

    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Gocker API Server starting on http://{}", addr);
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
