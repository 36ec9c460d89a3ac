use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fragtrack_core::Result;

mod config;
mod server;

use config::DaemonConfig;
use server::Daemon;

#[derive(Parser)]
#[command(author, version, about = "fragtrack tracker daemon", long_about = None)]
struct Cli {
    /// JSON config file; CLI flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address (host:port)
    #[arg(long)]
    listen: Option<String>,

    /// Transfer endpoint advertised to peers
    #[arg(long = "advertise")]
    advertised_endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(listen) = cli.listen {
        cfg.listen = listen;
    }
    if let Some(advertised) = cli.advertised_endpoint {
        cfg.advertised_endpoint = Some(advertised);
    }

    info!(listen = %cfg.listen, advertised = %cfg.advertised(), "starting fragtrackd");

    let listener = TcpListener::bind(&cfg.listen).await?;
    let daemon = Arc::new(Daemon::new(cfg.store_capacity));
    daemon.serve(listener).await?;
    Ok(())
}
