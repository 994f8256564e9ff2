//! TotalXP daemon - lifetime XP rewards for a game host
//!
//! Host events arrive on stdin, one JSON object per line. Everything the
//! engine asks the host to do comes back on stdout.

mod cli;
mod events;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use totalxp_core::config::migrate_file;
use totalxp_core::{
    Collaborators, PlaceholderFormatter, PlayerStore, ProgressionEngine, TotalXpConfig,
};
use tracing::{info, warn};

use crate::cli::Cli;
use crate::events::Dispatcher;
use crate::output::StdoutHost;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout is reserved for host records
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("TotalXP v{} starting", env!("CARGO_PKG_VERSION"));

    TotalXpConfig::write_default_if_missing(&cli.config)
        .with_context(|| format!("Failed to write default config {}", cli.config.display()))?;
    if !cli.no_migrate && migrate_file(&cli.config).context("Failed to migrate config")? {
        info!("Upgraded config file {}", cli.config.display());
    }
    let config = TotalXpConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    let database = cli
        .database
        .clone()
        .unwrap_or_else(|| config.storage.database.clone());
    let store = Arc::new(
        PlayerStore::open(&database)
            .await
            .with_context(|| format!("Failed to open database {}", database.display()))?,
    );
    info!("Database ready at {}", database.display());

    let host = Arc::new(StdoutHost);
    let (engine, mut expired_rx) = ProgressionEngine::new(
        &config,
        store,
        Collaborators {
            host: host.clone(),
            display: host,
            formatter: Arc::new(PlaceholderFormatter),
        },
    );
    info!("Loaded {} rewards", engine.ladder().len());

    let autosave = (config.storage.autosave_secs > 0).then(|| {
        engine
            .cache()
            .spawn_autosave(Duration::from_secs(config.storage.autosave_secs))
    });

    let mut dispatcher = Dispatcher::new(engine, cli.config.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => dispatcher.handle_line(&line).await,
                Ok(None) => {
                    info!("Host closed stdin");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            },
            Some(expired) = expired_rx.recv() => {
                dispatcher.engine_mut().handle_hide_expired(expired);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received interrupt");
                break;
            }
        }
    }

    if let Some(task) = autosave {
        task.abort();
    }
    info!("Shutting down gracefully");
    dispatcher.engine_mut().shutdown().await;

    Ok(())
}
