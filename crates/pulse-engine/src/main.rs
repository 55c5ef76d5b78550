//! Surveillance engine entrypoint.

use anyhow::Context;
use clap::Parser;
use pulse_engine::{AppConfig, Application};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Real-time prediction-market microstructure surveillance.
#[derive(Debug, Parser)]
#[command(name = "pulse", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit.
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    pulse_telemetry::init_logging().context("logging init")?;

    let config = AppConfig::load(cli.config.as_deref()).context("load configuration")?;
    if cli.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let app = Application::new(config).context("build application")?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            signal_token.cancel();
        }
    });

    app.run(shutdown).await.context("engine run")?;
    Ok(())
}
