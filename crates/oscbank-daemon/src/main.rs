//! oscbank Daemon - Main entry point
//!
//! Bridges a bank of digital inputs and outputs with OSC over UDP.

mod api;
mod classifier;
mod config;
mod lifecycle;
mod listener;
mod router;
mod server;
mod state;

use anyhow::Result;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Serial reported by the simulated board when none is configured
#[cfg(not(feature = "phidget"))]
const SIMULATED_SERIAL: i32 = 498255;

#[derive(Parser, Debug)]
#[command(name = "oscbank")]
#[command(about = "Digital I/O bank to OSC bridge")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "oscbank.toml")]
    config: PathBuf,

    /// IP address the OSC server listens on
    #[arg(long)]
    server_ip: Option<IpAddr>,

    /// Port the OSC server listens on
    #[arg(long)]
    server_port: Option<u16>,

    /// IP address input changes are sent to
    #[arg(long)]
    client_ip: Option<IpAddr>,

    /// Port input changes are sent to
    #[arg(long)]
    client_port: Option<u16>,

    /// Pin every channel to this device serial
    #[arg(short, long)]
    serial_number: Option<i32>,

    /// Channels per bank
    #[arg(short = 'n', long)]
    channels: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Write the effective configuration to this path and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

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

    info!("oscbank v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration, CLI flags win
    let mut config = config::load_config(&args.config)?;
    config.override_server(args.server_ip, args.server_port)?;
    config.override_client(args.client_ip, args.client_port)?;
    if let Some(serial) = args.serial_number {
        config.device.serial = Some(serial);
    }
    if let Some(channels) = args.channels {
        config.device.channels = channels;
    }
    config.validate()?;

    if let Some(path) = args.write_config {
        config::save_config(&path, &config)?;
        println!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    info!(
        server = %config.server.bind,
        client = %config.client.target,
        serial = ?config.device.serial,
        channels = config.device.channels,
        "Configuration loaded"
    );

    #[cfg(feature = "phidget")]
    let driver = {
        info!("Using the Phidget22 backend");
        oscbank_hw::PhidgetKit::new()
    };
    #[cfg(not(feature = "phidget"))]
    let driver = {
        let bank = oscbank_hw::SimulatedBank::new(
            config.device.serial.unwrap_or(SIMULATED_SERIAL),
            config.device.channels,
        );
        warn!(
            serial = %bank.serial(),
            "No hardware backend compiled in, using the simulated board"
        );
        bank
    };

    let bridge = lifecycle::Bridge::new(config, &driver)?;
    info!(
        scope = %bridge.scheme().scope(),
        channels = bridge.registry().len(),
        routes = bridge.dispatcher().len(),
        "Bridge configured"
    );

    let run_state = bridge.run_state();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping");
                run_state.request_stop();
            }
            Err(e) => warn!(error = %e, "Unable to listen for Ctrl-C"),
        }
    });

    bridge.run().await
}
