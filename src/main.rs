use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use social_scheduler::crypto::CryptoEngine;
use social_scheduler::providers::{self, ProviderRegistry};
use social_scheduler::scheduler::{refresh_daemon, scheduler_daemon};
use social_scheduler::store::{MemoryStore, PgStore, Stores};
use social_scheduler::{api, AppState, Config, SharedState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "social_scheduler=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!("social-scheduler v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}:{}", config.host, config.port);

    let stores = match (&config.database_url, &config.master_key) {
        (Some(url), Some(key)) => {
            let crypto = CryptoEngine::new(key)?;
            let store = PgStore::new(url, crypto).await?;
            store.migrate().await?;
            info!("Database connected and migrated");
            Stores::from_backend(Arc::new(store))
        }
        _ => {
            warn!("DATABASE_URL not set; using the in-memory store (state is lost on restart)");
            Stores::from_backend(Arc::new(MemoryStore::new()))
        }
    };

    let mut registry = ProviderRegistry::new();
    providers::register_defaults(&mut registry, &config)?;
    info!("Registered {} providers", registry.count());

    let state: SharedState = Arc::new(AppState::build(config.clone(), stores, Arc::new(registry)));

    tokio::spawn(scheduler_daemon(
        state.scheduler.clone(),
        config.scheduler_interval,
    ));
    tokio::spawn(refresh_daemon(
        state.stores.accounts.clone(),
        state.refresher.clone(),
        config.refresh_sweep_interval,
        config.refresh_sweep_window_mins,
    ));

    let app = api::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server ready");
    axum::serve(listener, app).await?;

    Ok(())
}
