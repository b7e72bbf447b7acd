use anyhow::Context;
use clap::Parser;
use rift_dev_proxy::config::{Config, ConfigOverrides};
use rift_dev_proxy::DevServer;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Hot-reloading mock server and proxy for local development
#[derive(Parser, Debug)]
#[command(name = "rift-dev-proxy")]
#[command(author, version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "RIFT_DEV_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port (overrides the config file)
    #[arg(short, long, env = "RIFT_DEV_PORT")]
    port: Option<u16>,

    /// Mock definition directory (overrides the config file)
    #[arg(short, long)]
    mock_dir: Option<PathBuf>,

    /// Disable local and remote mocking; only proxy rules apply
    #[arg(long)]
    no_mock: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let mut config = match args.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_overrides(&ConfigOverrides {
        port: args.port,
        mock_dir: args.mock_dir.clone(),
        no_mock: args.no_mock,
    });

    let server = DevServer::new(config).context("Failed to start rift-dev-proxy")?;
    info!("rift-dev-proxy {}", env!("CARGO_PKG_VERSION"));

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
