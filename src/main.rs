mod auth;
mod config;
mod middleware;

mod db;
mod error;
mod models;
mod routes;
mod services;
mod store;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::{
    config::Config,
    models::AppState,
    services::notify::LogNotifier,
    store::{MemorySeed, MemoryStore, PgStore, Store},
};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

async fn build_store(cfg: &Config) -> anyhow::Result<Arc<dyn Store>> {
    if let Some(url) = &cfg.database_url {
        let pool = db::connect_pg(url, cfg.db_max_connections).await?;
        return Ok(Arc::new(PgStore::new(pool)));
    }

    tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on exit");
    let store = match &cfg.memory_seed_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            let store = MemoryStore::from_json(&raw)?;
            tracing::info!(path = %path, "in-memory store seeded");
            store
        }
        None => MemoryStore::new(MemorySeed::default()),
    };
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;

    let state = AppState {
        store: build_store(&cfg).await?,
        notifier: Arc::new(LogNotifier),
        limits: cfg.limits,
    };

    // Browser clients call the API cross-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
