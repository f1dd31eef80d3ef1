//! webusb-host
//!
//! Diagnostic front end for the session layer: lists attached USB devices
//! with their WebUSB landing pages and follows attach/detach events.

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use host::report::{describe_device, describe_event};
use host::{HostConfig, HotplugWatcher, RusbTransport};
use session::{DeviceEvent, Session};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "webusb-host")]
#[command(
    author,
    version,
    about = "WebUSB host - inspect USB devices and their landing pages"
)]
#[command(long_about = "
Enumerates USB devices through libusb, reads their descriptors and the
WebUSB landing page URL, and optionally follows hot-plug events.

EXAMPLES:
    # List devices once
    webusb-host --list-devices

    # List devices as JSON
    webusb-host --list-devices --json

    # Follow attach/detach events
    webusb-host --watch

CONFIGURATION:
    The host looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/webusb-host/host.toml
    3. /etc/webusb-host/host.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit, the default mode
    #[arg(long)]
    list_devices: bool,

    /// Follow device attach/detach events until Ctrl+C
    #[arg(long)]
    watch: bool,

    /// Print devices and events as JSON
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = HostConfig::default();
        let path = HostConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        host::load_config(path).context("Failed to load configuration")?
    } else {
        HostConfig::load_or_default()
    };

    let log_level = args.log_level.as_deref().unwrap_or(&config.host.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("webusb-host v{}", env!("CARGO_PKG_VERSION"));

    let transport =
        Arc::new(RusbTransport::new(config.timeout()).context("Failed to initialize libusb")?);
    let session = Arc::new(Session::with_options(
        transport.clone(),
        config.to_session_options(),
    ));

    if args.watch && !args.list_devices {
        watch(&config, transport, session, args.json).await
    } else {
        list_devices(&session, args.json).await
    }
}

/// List USB devices and exit
async fn list_devices(session: &Session, json: bool) -> Result<()> {
    info!("Listing USB devices...");
    let devices = session
        .list_devices()
        .await
        .context("Failed to list devices")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No USB devices found.");
    } else {
        println!("Found {} USB device(s):\n", devices.len());
        for device in &devices {
            println!("{}", describe_device(device));
        }
    }

    Ok(())
}

/// Print the current devices, then every attach/detach until Ctrl+C
async fn watch(
    config: &HostConfig,
    transport: Arc<RusbTransport>,
    session: Arc<Session>,
    json: bool,
) -> Result<()> {
    let subscription = session.subscribe();

    let (event_tx, event_rx) = async_channel::bounded(config.events.queue_capacity);
    let watcher = HotplugWatcher::spawn(transport.context().clone(), event_tx)
        .context("Failed to start hot-plug watcher")?;
    let event_loop = session.spawn_event_loop(event_rx);

    list_devices(&session, json).await?;
    info!("Watching for device events, press Ctrl+C to stop");

    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Ok(event) => print_event(&event, json)?,
                Err(e) => {
                    error!("Event stream ended: {}", e);
                    break;
                }
            },
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Error waiting for Ctrl+C: {}", e);
                }
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    // Stopping the watcher drops the sender, which ends the event loop
    tokio::task::spawn_blocking(move || watcher.stop())
        .await
        .context("Hot-plug watcher shutdown failed")?;
    if let Err(e) = event_loop.await {
        error!("Event loop task failed: {}", e);
    }

    Ok(())
}

fn print_event(event: &DeviceEvent, json: bool) -> Result<()> {
    if json {
        let value = match event {
            DeviceEvent::Connected(device) => {
                serde_json::json!({ "event": "connected", "device": device })
            }
            DeviceEvent::Disconnected(handle) => {
                serde_json::json!({ "event": "disconnected", "handle": handle })
            }
        };
        println!("{}", serde_json::to_string(&value)?);
    } else {
        println!("{}", describe_event(event));
    }
    Ok(())
}
