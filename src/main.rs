//! BLE MIDI Bridge
//!
//! Forwards MIDI from a Bluetooth LE instrument to a local MIDI output port.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use colored::*;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ble_midi_bridge::paths::AppPaths;
use ble_midi_bridge::sink::midi_out::MidirSink;
use ble_midi_bridge::sink::{is_virtual_port, OutputSink};
use ble_midi_bridge::transport::ble::BleTransport;
use ble_midi_bridge::transport::{find_device, Transport};
use ble_midi_bridge::{BridgeConfig, BridgeEvent, ChannelReporter, ConnectionSupervisor};

/// BLE MIDI Bridge - forward a Bluetooth LE MIDI instrument to a MIDI output port
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: detected)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Device name to look for (case-insensitive substring)
    #[arg(short, long)]
    device: Option<String>,

    /// MIDI output port name
    #[arg(short, long)]
    port: Option<String>,

    /// Stop on the first failure instead of retrying
    #[arg(long)]
    no_auto_reconnect: bool,

    /// Seconds to wait between reconnect cycles
    #[arg(long)]
    scan_interval: Option<u64>,

    /// List available MIDI output ports
    #[arg(long)]
    list_ports: bool,

    /// Scan once and list nearby BLE devices
    #[arg(long)]
    list_devices: bool,

    /// Save the effective settings to the configuration file
    #[arg(long)]
    save_config: bool,
}

impl Args {
    /// Command line values override the file
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(device) = &self.device {
            config.device_name = device.clone();
        }
        if let Some(port) = &self.port {
            config.midi_port = Some(port.clone());
        }
        if self.no_auto_reconnect {
            config.auto_reconnect = false;
        }
        if let Some(interval) = self.scan_interval {
            config.scan_interval_secs = interval;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting BLE MIDI Bridge v{}...", env!("CARGO_PKG_VERSION"));

    if args.list_ports {
        return list_ports();
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| AppPaths::detect().config);
    info!("Configuration file: {}", config_path.display());

    let mut config = BridgeConfig::load_or_default(&config_path).await?;
    args.apply(&mut config);
    config.validate().context("Invalid settings")?;

    if args.save_config {
        config.save(&config_path).await?;
        info!("Settings saved to {}", config_path.display());
    }

    if args.list_devices {
        return list_devices(&config).await;
    }

    run_bridge(config, shutdown_signal()).await?;

    info!("BLE MIDI Bridge shutdown complete");
    Ok(())
}

async fn run_bridge(config: BridgeConfig, shutdown: impl Future<Output = ()>) -> Result<()> {
    let transport = BleTransport::new()
        .await
        .context("Bluetooth is not available")?;

    let (reporter, mut events) = ChannelReporter::new();
    let supervisor = ConnectionSupervisor::new(
        config,
        Arc::new(transport),
        Arc::new(MidirSink::default()),
        Arc::new(reporter.clone()),
        Arc::new(reporter),
    );
    let handle = supervisor.start();

    tokio::pin!(shutdown);
    let mut stopping = false;

    // The channel closes once the supervisor has released everything
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            _ = &mut shutdown, if !stopping => {
                info!("Stopping bridge...");
                handle.stop();
                stopping = true;
            }
        }
    }

    let stats = handle.join().await?;
    info!("Session summary: {}", stats);

    Ok(())
}

fn print_event(event: &BridgeEvent) {
    match event {
        BridgeEvent::Status(text) => {
            let line = if text.starts_with("Streaming") {
                text.green().bold()
            } else if text.contains("retrying") || text.contains("unavailable") {
                text.yellow()
            } else if text.contains("stopping") || text.starts_with("Bridge stopped") {
                text.red()
            } else {
                text.cyan()
            };
            println!("{}", line);
        },
        BridgeEvent::Activity(text) => {
            let stamp = format!("[{}]", Local::now().format("%H:%M:%S"));
            println!("{} {}", stamp.dimmed(), text);
        },
    }
}

fn list_ports() -> Result<()> {
    let ports = MidirSink::default().list_ports()?;

    println!("\n{}", "MIDI Output Ports:".bold());
    if ports.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (i, name) in ports.iter().enumerate() {
        if is_virtual_port(name) {
            println!("  [{}] {} {}", i, name, "(virtual)".green());
        } else {
            println!("  [{}] {}", i, name);
        }
    }

    Ok(())
}

async fn list_devices(config: &BridgeConfig) -> Result<()> {
    let transport = BleTransport::new()
        .await
        .context("Bluetooth is not available")?;

    println!(
        "Scanning for {}s...",
        config.scan_timeout_secs.to_string().yellow()
    );
    let devices = transport.scan(config.scan_timeout()).await?;
    let target = find_device(&devices, &config.device_name);

    println!("\n{}", "BLE Devices:".bold());
    if devices.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for device in &devices {
        let line = format!("{} ({})", device.name, device.address);
        if Some(device) == target {
            println!("  {} {}", line.green(), "<- target".green());
        } else {
            println!("  {}", line);
        }
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to install CTRL+C signal handler: {}", e);
            std::future::pending::<()>().await;
        },
    }
}
