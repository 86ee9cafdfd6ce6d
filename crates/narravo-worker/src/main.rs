//! Worker binary.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use narravo_catalog::{Catalog, RedisStore, SecretCipher};
use narravo_queue::{ProgressChannel, TaskQueue};
use narravo_storage::{MaterialResolver, StorageClient};
use narravo_subtitle::WhisperApiTranscriber;
use narravo_worker::{HeuristicParser, TaskExecutor, WorkerConfig, WorkerContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = WorkerConfig::from_env();
    info!(?config, "starting narravo worker");

    let storage = StorageClient::from_env().await?;
    let resolver = MaterialResolver::new(storage.clone());
    let catalog = Catalog::new(Arc::new(RedisStore::from_env()?), SecretCipher::from_env()?);
    let progress = ProgressChannel::from_env()?;

    let transcriber = {
        let api_key = std::env::var("WHISPER_API_KEY")
            .map_err(|_| anyhow::anyhow!("WHISPER_API_KEY not set"))?;
        let mut transcriber = WhisperApiTranscriber::new(api_key);
        if let Ok(base) = std::env::var("WHISPER_BASE_URL") {
            transcriber = transcriber.with_base_url(base);
        }
        if let Ok(model) = std::env::var("WHISPER_MODEL") {
            transcriber = transcriber.with_model(model);
        }
        Arc::new(transcriber)
    };

    let ctx = Arc::new(WorkerContext {
        config,
        catalog,
        storage,
        resolver,
        progress,
        transcriber,
        parser: Arc::new(HeuristicParser::new()),
    });

    let queue = TaskQueue::from_env()?;
    let executor = Arc::new(TaskExecutor::new(ctx, queue));

    // Graceful shutdown on ctrl-c / SIGTERM.
    {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown requested");
            executor.shutdown();
        });
    }

    executor.run().await?;
    Ok(())
}
