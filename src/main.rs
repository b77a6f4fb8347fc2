// ABOUTME: Main entry point for the Indirex remote meter terminal

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::DisableBracketedPaste,
    execute,
    terminal::{disable_raw_mode, LeaveAlternateScreen},
};
use indirex_term::{
    config::AppConfig,
    identity::{EnvIdentity, IdentityProvider, StaticIdentity},
    terminal::SessionTarget,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Open a remote shell on an Indirex meter through the SSH relay
#[derive(Debug, Parser)]
#[command(name = "indirex-term", version, about)]
struct Cli {
    /// Meter identifier to connect to
    meter_id: String,

    /// Remote port on the meter (defaults to the configured port)
    #[arg(short, long)]
    port: Option<u16>,

    /// WebSocket URL of the SSH relay
    #[arg(long)]
    relay_url: Option<String>,

    /// Operator identity announced to the relay
    #[arg(short, long)]
    user: Option<String>,

    /// Path to a config file instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Automatic reconnect attempts after the session ends
    #[arg(long)]
    reconnect: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    setup_logging(&config)?;
    setup_panic_handler();

    let target = SessionTarget::new(cli.meter_id, cli.port.unwrap_or(config.default_port));
    let identity: Arc<dyn IdentityProvider> = match &config.user_id {
        Some(user) => Arc::new(StaticIdentity::new(user.clone())),
        None => Arc::new(EnvIdentity::default()),
    };

    tracing::info!("Starting indirex-term for {}", target);
    indirex_term::app::run(config, target, identity).await
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => load_explicit(path)?,
        None => match AppConfig::config_path() {
            Some(path) => AppConfig::load_from(&path)?,
            None => AppConfig::default(),
        },
    };
    config.apply_env_overrides();

    if let Some(url) = &cli.relay_url {
        config.relay_url = url.clone();
    }
    if let Some(user) = &cli.user {
        config.user_id = Some(user.clone());
    }
    if let Some(attempts) = cli.reconnect {
        config.reconnect.max_attempts = attempts;
    }

    config.validate()?;
    Ok(config)
}

fn load_explicit(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        anyhow::bail!("Config file {} does not exist", path.display());
    }
    Ok(AppConfig::load_from(path)?)
}

fn setup_logging(config: &AppConfig) -> Result<()> {
    use std::fs::OpenOptions;
    use tracing_subscriber::prelude::*;

    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let log_file = log_dir.join(format!(
        "indirex-term-{}.log",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .with_context(|| format!("Failed to create log file {}", log_file.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(file)
                .with_ansi(false), // No ANSI colors in log file
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.as_str().into()),
        )
        .init();

    Ok(())
}

fn setup_panic_handler() {
    use tracing::error;

    std::panic::set_hook(Box::new(|panic_info| {
        // Ensure terminal is restored before logging the panic
        let _ = disable_raw_mode();
        let _ = execute!(std::io::stderr(), DisableBracketedPaste, LeaveAlternateScreen);

        error!("Application panicked: {}", panic_info);
        eprintln!("Application panicked: {}", panic_info);
        eprintln!("Please check the logs for more details.");
    }));
}
