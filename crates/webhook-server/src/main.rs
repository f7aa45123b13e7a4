//! Callbridge webhook server
//!
//! Receives call webhooks from the telephony provider and stores them as
//! canonical call records in SQLite.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use callbridge_ingest_core::{
    seed_default_dispositions, setup_logging, CallbridgeConfig, SqliteCallStore, WebhookEngine,
};
use callbridge_webhook_server::{create_router, AppState};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Telephony webhook ingestion server", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "CALLBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database URL (overrides the config file)
    #[arg(long)]
    database_url: Option<String>,

    /// Address to listen on (overrides the config file)
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Install the standard disposition catalog before serving
    #[arg(long)]
    seed_dispositions: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = CallbridgeConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    setup_logging(&config.logging)?;

    let store = Arc::new(
        SqliteCallStore::new(&config.database_url)
            .await
            .with_context(|| format!("opening database {}", config.database_url))?,
    );

    if args.seed_dispositions {
        seed_default_dispositions(&*store).await?;
    }

    let engine = WebhookEngine::new(store, &config.engine)?;
    let app = create_router(AppState::new(engine));

    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("binding {}", config.bind_address))?;
    info!(
        address = %listener.local_addr()?,
        callback_window_hours = config.engine.callback_window_hours,
        "Callbridge listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
