use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use depot::config::Config;
use depot::core::{ExpirySweeper, JobRegistry, StorageServer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "depot.toml".to_string());
    let config = Config::load(Path::new(&config_path))?;

    let registry = Arc::new(JobRegistry::new());
    let server = Arc::new(StorageServer::new(registry.clone(), &config.storage_dir));
    let listener = StorageServer::bind(&config.listen)
        .await
        .with_context(|| format!("cannot listen on {}", config.listen))?;

    let shutdown = CancellationToken::new();
    let mut accept = tokio::spawn(server.serve(listener, shutdown.clone()));

    if config.sweep_interval_secs > 0 {
        let sweeper = ExpirySweeper::new(&config.storage_dir, &config.metadata_dir);
        let interval = Duration::from_secs(config.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match sweeper.sweep().await {
                    Ok(stats) => tracing::info!(
                        "sweep finished: {} jobs expired, {} files removed, {} errors",
                        stats.jobs_expired,
                        stats.files_removed,
                        stats.errors
                    ),
                    Err(err) => tracing::warn!("sweep failed: {err}"),
                }
            }
        });
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            shutdown.cancel();
        }
        joined = &mut accept => {
            joined.context("accept loop panicked")?;
            return Ok(());
        }
    }

    accept.await.context("accept loop panicked")?;
    Ok(())
}
