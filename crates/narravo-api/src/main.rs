//! API binary.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use narravo_api::{routes, ApiConfig, AppState};
use narravo_catalog::{Catalog, RedisStore, SecretCipher};
use narravo_queue::{ProgressChannel, TaskQueue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ApiConfig::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    let bind_addr = config.bind_addr.clone();

    let catalog = Catalog::new(Arc::new(RedisStore::from_env()?), SecretCipher::from_env()?);
    let queue = TaskQueue::from_env()?;
    queue.init().await?;
    let progress = ProgressChannel::from_env()?;

    let state = AppState::new(config, catalog, queue, progress);
    let app = routes::build_router(state);

    info!(%bind_addr, "starting narravo api");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
