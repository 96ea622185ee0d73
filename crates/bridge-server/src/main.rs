//! Websocket gateway binary.

use std::path::PathBuf;

use anyhow::Result;
use bridge_server::config::Config;
use bridge_server::server;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "bridge-server")]
#[clap(about = "Websocket gateway to a running Creatures engine")]
struct Cli {
    /// TOML configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[clap(short, long)]
    bind: Option<String>,

    /// Websocket port
    #[clap(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    info!(
        "starting bridge-server on {}:{} (max_clients = {})",
        config.bind_addr, config.port, config.max_clients
    );

    tokio::select! {
        res = server::run(config) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}
