use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use clinic_be::config::AppConfig;
use clinic_be::db::{MemoryStore, PgStore, Store};
use clinic_be::routes::app_router;
use clinic_be::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::debug!(?config, "configuration loaded");

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.max_connections)
                .await
                .context("failed to connect to Postgres")?;
            store.migrate().await.context("failed to run migrations")?;
            tracing::info!("connected to Postgres");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, data is kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::from_config(&config, store).context("invalid field encryption key")?;
    let app = app_router(state, config.cors_allow_any);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
