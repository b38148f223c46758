use anyhow::Context;
use clap::Parser;
use fleetd::config::DaemonConfig;
use fleetd::daemon::Daemon;
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// fleetd daemon - supervises tenant backends and serves the CLI socket
#[derive(Parser)]
#[command(name = "fleetd-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file (.toml or .json)
    #[arg(short, long, env = "FLEETD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = DaemonConfig::load(args.config.as_deref()).map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        data_dir = %config.data_dir.display(),
        backend = %config.backend.binary.display(),
        base_port = config.backend.base_port,
        proxy = config.proxy.enabled,
        "Configuration loaded"
    );

    let daemon = Daemon::new(config).context("Failed to initialize daemon")?;

    let shutdown = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        trigger.cancel();
    });

    daemon.run(shutdown).await?;
    Ok(())
}
