//! trainer-driver
//!
//! Reads power, pulse and cadence from a Monark ergometer over serial and
//! rebroadcasts them as an ANT+ power meter through a USB wireless stick.

use anyhow::{Context, Result};
use clap::Parser;
use common::{
    ErgometerBridge, ErgometerEvent, ErgometerSession, LinkMetrics, WirelessBridge,
    create_ergometer_bridge, create_wireless_bridge, setup_logging,
};
use driver::DriverConfig;
use driver::serial::{SystemPorts, describe_ports, spawn_ergometer_worker};
use driver::wireless::{ChannelTable, PowerMeterProxy, UsbStick, spawn_wireless_worker};
use protocol::Channel;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "trainer-driver")]
#[command(
    author,
    version,
    about = "Ergometer to ANT+ bridge - drive a Monark bike and broadcast its power"
)]
#[command(long_about = "
Polls a Monark ergometer over its serial port and rebroadcasts power and
cadence as an ANT+ power meter through a USB wireless stick.

EXAMPLES:
    # Run with default config
    trainer-driver

    # Use a specific serial port first
    trainer-driver --port /dev/ttyUSB0

    # List serial ports and wireless sticks and exit
    trainer-driver --list-ports

    # Ergometer only, debug logging
    trainer-driver --no-wireless --log-level debug

CONFIGURATION:
    The driver looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/trainer-driver/driver.toml
    3. /etc/trainer-driver/driver.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// List serial ports and wireless sticks and exit
    #[arg(long)]
    list_ports: bool,

    /// Do not start the wireless stick driver
    #[arg(long)]
    no_wireless: bool,

    /// Do not start the ergometer driver
    #[arg(long)]
    no_ergometer: bool,

    /// Serial port to try first
    #[arg(short, long, value_name = "NAME")]
    port: Option<String>,
}

type Worker = JoinHandle<common::Result<()>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = DriverConfig::default();
        let path = DriverConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        DriverConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        DriverConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.general.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("trainer-driver v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    if args.list_ports {
        return list_ports_mode(&config);
    }

    let metrics = Arc::new(LinkMetrics::new());

    // Ergometer
    let mut ergometer = None;
    if config.ergometer.enabled && !args.no_ergometer {
        let session = Arc::new(ErgometerSession::new(config.ergometer.poll_interval_ms));
        let (bridge, worker) = create_ergometer_bridge(session);
        if let Some(port) = args.port.clone().or_else(|| config.ergometer.port.clone()) {
            bridge
                .set_serial_port(port)
                .context("Failed to set serial port")?;
        }
        let handle = spawn_ergometer_worker(
            SystemPorts::new(),
            worker,
            config.ergometer.settings(),
            Arc::clone(&metrics),
        )
        .context("Failed to spawn ergometer worker thread")?;
        ergometer = Some((bridge, handle));
    } else {
        info!("Ergometer driver disabled");
    }

    // Wireless stick
    let mut wireless = None;
    if config.wireless.enabled && !args.no_wireless {
        let channel = Channel::new(config.wireless.power_meter_channel)
            .context("Invalid power meter channel")?;
        let mut table = ChannelTable::new();
        table.register(
            channel,
            Box::new(PowerMeterProxy::new(
                channel,
                config.wireless.network,
                config.wireless.device_number,
            )),
        );

        let (bridge, worker) = create_wireless_bridge();
        let ids = config.wireless.parsed_usb_ids();
        let handle = spawn_wireless_worker(
            move || UsbStick::open(&ids),
            worker,
            table,
            config.wireless.settings(),
            Arc::clone(&metrics),
        )
        .context("Failed to spawn wireless worker thread")?;
        wireless = Some((bridge, handle));
    } else {
        info!("Wireless driver disabled");
    }

    let forward = ergometer.as_ref().map(|(bridge, _)| {
        tokio::spawn(forward_events(
            bridge.clone(),
            wireless.as_ref().map(|(bridge, _)| bridge.clone()),
        ))
    });
    let reporter = spawn_metrics_reporter(&metrics, config.general.metrics_interval_secs);

    info!("Press Ctrl+C to shutdown");
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => error!("Error waiting for Ctrl+C: {}", e),
    }

    if let Some(task) = forward {
        task.abort();
    }
    if let Some(task) = reporter {
        task.abort();
    }

    if let Some((bridge, handle)) = ergometer {
        if let Err(e) = bridge.shutdown().await {
            debug!("Ergometer worker already gone: {}", e);
        }
        join_worker("ergometer", handle);
    }
    if let Some((bridge, handle)) = wireless {
        if let Err(e) = bridge.shutdown().await {
            debug!("Wireless worker already gone: {}", e);
        }
        join_worker("wireless", handle);
    }

    info!("Final metrics: {}", metrics_json(&metrics));
    Ok(())
}

/// Log ergometer events and hand readings to the wireless proxy
async fn forward_events(ergometer: ErgometerBridge, wireless: Option<WirelessBridge>) {
    while let Ok(event) = ergometer.recv_event().await {
        match event {
            ErgometerEvent::ConnectionStatus(true) => info!("Ergometer connected"),
            ErgometerEvent::ConnectionStatus(false) => warn!("Ergometer disconnected"),
            ErgometerEvent::Power(watts) => {
                debug!("Power: {} W", watts);
                if let Some(wireless) = &wireless {
                    if let Err(e) = wireless.set_current_power(watts).await {
                        debug!("Wireless worker not accepting power: {}", e);
                    }
                }
            }
            ErgometerEvent::Pulse(bpm) => debug!("Pulse: {} bpm", bpm),
            ErgometerEvent::Cadence(rpm) => {
                debug!("Cadence: {} rpm", rpm);
                if let Some(wireless) = &wireless {
                    if let Err(e) = wireless.set_current_cadence(rpm).await {
                        debug!("Wireless worker not accepting cadence: {}", e);
                    }
                }
            }
        }
    }
}

fn spawn_metrics_reporter(
    metrics: &Arc<LinkMetrics>,
    interval_secs: u64,
) -> Option<tokio::task::JoinHandle<()>> {
    if interval_secs == 0 {
        return None;
    }
    let metrics = Arc::clone(metrics);
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.tick().await;
        loop {
            interval.tick().await;
            info!("Metrics: {}", metrics_json(&metrics));
        }
    }))
}

fn metrics_json(metrics: &LinkMetrics) -> String {
    serde_json::to_string(&metrics.snapshot()).unwrap_or_else(|e| e.to_string())
}

fn join_worker(name: &str, handle: Worker) {
    match handle.join() {
        Ok(Ok(())) => info!("{} worker stopped", name),
        Ok(Err(e)) => error!("{} worker failed: {}", name, e),
        Err(e) => error!("{} worker thread panicked: {:?}", name, e),
    }
}

/// List serial ports and wireless sticks and exit
fn list_ports_mode(config: &DriverConfig) -> Result<()> {
    let ports = describe_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found.");
    } else {
        println!("Found {} serial port(s):", ports.len());
        for port in ports {
            println!("  {}", port);
        }
    }

    match UsbStick::list(&config.wireless.parsed_usb_ids()) {
        Ok(sticks) if sticks.is_empty() => println!("\nNo wireless sticks found."),
        Ok(sticks) => {
            println!("\nFound {} wireless stick(s):", sticks.len());
            for stick in sticks {
                println!("  {}", stick);
            }
        }
        Err(e) => println!("\nCannot enumerate USB devices: {}", e),
    }

    Ok(())
}
