//! logcast server
//!
//! Usage:
//!     logcast --config /etc/logcast/monitor_config.toml

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use logcast::config::DEFAULT_CONFIG_PATH;
use logcast::{
    Config, Credentials, DirectoryScanner, FsEvents, Hub, IncrementalReader, OffsetStore, Server,
    Tailer,
};

#[derive(Parser, Debug)]
#[command(name = "logcast", about = "Stream appended log lines to WebSocket viewers")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "LOGCAST_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logcast=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::error!("{:#}", e);
        return Err(e);
    }

    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    let offsets = Arc::new(OffsetStore::new());
    let hub = Arc::new(Hub::new(config.server.subscriber_buffer));
    let credentials = Arc::new(Credentials::from(&config.auth));

    // Any root that can't be fully scanned aborts startup
    let mut events = FsEvents::new().context("failed to create watcher")?;
    let scanner = DirectoryScanner::new(Arc::clone(&offsets));
    for root in config.logs.directories() {
        scanner
            .scan_root(&root, &mut events)
            .with_context(|| format!("failed to initialize file offsets for {}", root.display()))?;
    }
    tracing::info!(files = offsets.len(), "initial scan complete");

    let server = Server::bind(&config.server, Arc::clone(&hub), credentials).await?;

    let tailer = Tailer::new(events, IncrementalReader::new(offsets), hub);
    let tail_task = tokio::spawn(tailer.run());

    server
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    tail_task.abort();
    Ok(())
}
