//! Skybridge Daemon - Main entry point
//!
//! Serves bus devices over the ASCOM Alpaca REST API and answers Alpaca
//! discovery probes.

mod alpaca;
mod api;
mod config;
mod feed;
mod listener;
mod server;
mod state;
#[cfg(test)]
mod test_util;

use anyhow::{Context, Result};
use clap::Parser;
use skybridge_core::CommonTranslator;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Bus events buffered between the feed and the listener
const EVENT_QUEUE_DEPTH: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "skybridge")]
#[command(about = "ASCOM Alpaca bridge for device bus drivers")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "skybridge.toml")]
    config: PathBuf,

    /// Bind address for the Alpaca server
    #[arg(short, long)]
    bind: Option<String>,

    /// UDP port for Alpaca discovery
    #[arg(short, long)]
    discovery_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Print an example configuration and exit
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_default_config {
        print!("{}", toml::to_string_pretty(&config::Config::example())?);
        return Ok(());
    }

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Skybridge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }
    if let Some(port) = args.discovery_port {
        config.discovery.port = port;
    }

    info!(
        bind = %config.daemon.bind,
        discovery_port = config.discovery.port,
        devices = config.devices.len(),
        "Configuration loaded"
    );

    // The discovery reply advertises the port actually bound
    let listener = TcpListener::bind(&config.daemon.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.daemon.bind))?;
    let alpaca_port = listener.local_addr()?.port();

    let devices = config.devices.clone();
    let state = state::AppState::new(config, Arc::new(CommonTranslator::new()), alpaca_port);

    let (events, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let bus_listener = tokio::spawn(listener::run(state.clone(), rx));
    feed::announce(&devices, &events).await?;

    state.start().await;
    let served = server::run(state.clone(), listener).await;

    state.shutdown().await;
    drop(events);
    if let Err(e) = bus_listener.await {
        tracing::error!(error = %e, "Bus event listener ended abnormally");
    }

    served
}
