//! matcomp daemon - multi-task prediction comparison service
//!
//! Fetches task predictions from the backend, compares them and keeps a
//! history of saved comparisons.

use anyhow::Result;
use clap::Parser;
use matcomp_common::Config;
use matcompd::server::{self, AppState};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "matcompd", version, about = "Multi-task prediction comparison daemon")]
struct Args {
    /// Config file (default: $MATCOMP_CONFIG, /etc/matcomp/config.toml, user config)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Listen address, overrides [server] bind
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("matcompd v{} starting", env!("CARGO_PKG_VERSION"));

    let state = AppState::from_config(&config)?;
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());

    server::run(state, &bind).await?;
    info!("matcompd stopped");
    Ok(())
}
